use crate::network::AppSignal;

pub fn connection(connected: bool) -> String {
    if connected {
        "● connected".to_string()
    } else {
        "○ disconnected, sending over REST".to_string()
    }
}

pub fn typing(user_id: &str) -> String {
    format!("{user_id} is typing…")
}

pub fn error(message: &str) -> String {
    format!("! {message}")
}

pub fn signal(signal: &AppSignal) -> String {
    match signal {
        AppSignal::SessionExpired => "! Session expired, please log in again".to_string(),
        AppSignal::Forbidden(message) => format!("! Forbidden: {message}"),
        AppSignal::NotFound(path) => format!("! Not found: {path}"),
        AppSignal::ServerError { status, message } => format!("! Server error {status}: {message}"),
    }
}
