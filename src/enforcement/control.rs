use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Mutex;

/// Side effects on the game server
pub trait ServerControl: Send + Sync {
    /// Disconnect `player` showing `message`
    fn kick(&self, player: &str, message: &str) -> Result<()>;
}

/// Writes console commands to a sink, stdout by default
///
/// Suits a wrapper that pipes this process's output into the server console.
pub struct ConsoleServerControl<W: Write + Send = io::Stdout> {
    sink: Mutex<W>,
}

impl ConsoleServerControl {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleServerControl<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Strip control characters so a value cannot start a second console command
fn console_safe(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

impl<W: Write + Send> ServerControl for ConsoleServerControl<W> {
    fn kick(&self, player: &str, message: &str) -> Result<()> {
        if player.is_empty() || player.chars().any(char::is_whitespace) {
            return Err(anyhow::anyhow!("Refusing to kick invalid player name {:?}", player));
        }

        let mut sink = self
            .sink
            .lock()
            .map_err(|_| anyhow::anyhow!("Console sink lock poisoned"))?;
        writeln!(sink, "kick {} {}", console_safe(player), console_safe(message))
            .context("Failed to write kick command")?;
        sink.flush().context("Failed to flush console")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kick_command_format() {
        let control = ConsoleServerControl::new(Vec::new());
        control.kick("Alice", "§cbanned").unwrap();
        let output = String::from_utf8(control.into_inner()).unwrap();
        assert_eq!(output, "kick Alice §cbanned\n");
    }

    #[test]
    fn test_kick_rejects_injection() {
        let control = ConsoleServerControl::new(Vec::new());
        assert!(control.kick("Alice\nop Mallory", "bye").is_err());
        assert!(control.kick("", "bye").is_err());

        control.kick("Alice", "bye\nop Mallory").unwrap();
        let output = String::from_utf8(control.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 1);
    }
}
