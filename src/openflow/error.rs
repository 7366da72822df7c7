use openflow::messages::*;
use std::error;
use std::fmt;
use std::io;
use std::result;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// The buffer ends before the advertised message does.
    /// Carries the number of bytes that are still missing.
    Incomplete(usize),
    BadRequest(OfpBadRequestCode),
    BadAction(OfpBadActionCode),
    FlowModFailed(OfpFlowModFailedCode),
    PortModFailed(OfpPortModFailedCode),
    HelloFailed,
}

impl Error {
    /// The type/code pair this error is reported with on the wire.
    pub fn type_and_code(&self) -> (OfpErrorType, u16) {
        match *self {
            Error::HelloFailed => (
                OfpErrorType::HelloFailed,
                OfpHelloFailedCode::Incompatible as u16,
            ),
            Error::BadAction(code) => (OfpErrorType::BadAction, code as u16),
            Error::FlowModFailed(code) => (OfpErrorType::FlowModFailed, code as u16),
            Error::PortModFailed(code) => (OfpErrorType::PortModFailed, code as u16),
            Error::BadRequest(code) => (OfpErrorType::BadRequest, code as u16),
            Error::Io(_) | Error::Incomplete(_) => (
                OfpErrorType::BadRequest,
                OfpBadRequestCode::BadLen as u16,
            ),
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "OpenFlow protocol error"
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Incomplete(n) => write!(f, "{} more bytes are needed", n),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // Bodies are only parsed once the whole message is buffered,
        // so running out of bytes means the advertised layout is wrong.
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::BadRequest(OfpBadRequestCode::BadLen)
        }
        else {
            Error::Io(e)
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
