//! Peripherals built on the scheduler and the plug protocol.

pub mod dummy;
pub mod joystick;
pub mod serial;
pub mod timer;

pub use self::joystick::{Button, Joystick, JoystickDevice, JoystickPort, JOYSTICK_CLASS};
pub use self::serial::{SerialInDevice, SerialInPort, SERIAL_IN_CLASS};
pub use self::serial::reader::{ByteQueue, SerialFeed, SerialReader};
pub use self::timer::Timer;
