//! Operator commands typed on the console

use crate::error::{MechanicError, Result};

/// One line of operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Show the available endpoints
    List,
    /// Select the endpoint at this index of the last listing
    Select(usize),
    /// Stop the session
    Pause,
    /// Start the session again
    Resume,
    /// Exit
    Quit,
}

impl Command {
    /// Parse a line; blank or unknown input yields `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Ok(index) = line.parse::<usize>() {
            return Some(Self::Select(index));
        }

        match line.to_ascii_lowercase().as_str() {
            "l" | "list" => Some(Self::List),
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" => Some(Self::Resume),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Look up the endpoint an operator picked from a listing
///
/// # Errors
///
/// - `NoEndpoints`: the listing was empty
/// - `EndpointIndex`: `index` is past the end of the listing
pub fn pick_endpoint(endpoints: &[String], index: usize) -> Result<&str> {
    if endpoints.is_empty() {
        return Err(MechanicError::NoEndpoints);
    }

    endpoints
        .get(index)
        .map(String::as_str)
        .ok_or(MechanicError::EndpointIndex {
            index,
            available: endpoints.len(),
        })
}

/// Help text for the console
pub const HELP: &str = "commands: list | <number> select endpoint | pause | resume | quit";
