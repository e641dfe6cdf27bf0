use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write, BufReader, BufWriter};

/// Open `path`, or stdin when there is none or it is "-".
pub fn get_input(path: Option<String>) -> io::Result<Box<dyn Read>> {
    match path {
        Some(ref path) if path != "-" => {
            File::open(path).map(|f| Box::new(BufReader::new(f)) as Box<dyn Read>)
        }
        _ => Ok(Box::new(io::stdin())),
    }
}

/// Create or truncate `path`, or use stdout when there is none or it is "-".
pub fn get_output(path: Option<String>) -> io::Result<Box<dyn Write>> {
    match path {
        Some(ref path) if path != "-" => {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
                .map(|f| Box::new(BufWriter::new(f)) as Box<dyn Write>)
        }
        _ => Ok(Box::new(io::stdout())),
    }
}

macro_rules! die {
    ( $exit:expr, $($x:expr),* ) => (
        {
            let mut stderr = ::std::io::stderr();
            let _ = writeln!(stderr, $($x),*);
            return $exit;
        }
    )
}
