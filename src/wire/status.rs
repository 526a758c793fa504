// -----------------------------------------------------------------------------
// ----- StatusCode ------------------------------------------------------------

/// WebDriver wire-protocol status codes. The numeric values are part of the
/// protocol and must never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    Success,
    NoSuchDriver,
    NoSuchElement,
    NoSuchFrame,
    UnknownCommand,
    StaleElementReference,
    UnknownError,
    JavaScriptError,
    Timeout,
    NoSuchWindow,
    InvalidSelector,
    SessionNotCreated,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Success => 0,
            StatusCode::NoSuchDriver => 6,
            StatusCode::NoSuchElement => 7,
            StatusCode::NoSuchFrame => 8,
            StatusCode::UnknownCommand => 9,
            StatusCode::StaleElementReference => 10,
            StatusCode::UnknownError => 13,
            StatusCode::JavaScriptError => 17,
            StatusCode::Timeout => 21,
            StatusCode::NoSuchWindow => 23,
            StatusCode::InvalidSelector => 32,
            StatusCode::SessionNotCreated => 33,
        }
    }

    pub fn from_code(code: u16) -> Option<StatusCode> {
        let status = match code {
            0 => StatusCode::Success,
            6 => StatusCode::NoSuchDriver,
            7 => StatusCode::NoSuchElement,
            8 => StatusCode::NoSuchFrame,
            9 => StatusCode::UnknownCommand,
            10 => StatusCode::StaleElementReference,
            13 => StatusCode::UnknownError,
            17 => StatusCode::JavaScriptError,
            21 => StatusCode::Timeout,
            23 => StatusCode::NoSuchWindow,
            32 => StatusCode::InvalidSelector,
            33 => StatusCode::SessionNotCreated,
            _ => return None,
        };
        Some(status)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
