//! Power actuator seam
//!
//! The watchdog never talks to the smart plug directly: it goes through the
//! `PowerSwitch` capability so tests can substitute a fake. The production
//! implementation shells out to a configured command template (the plug
//! vendor ships a CLI), bounded by a hard deadline so a hung command cannot
//! wedge the engine.

use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("no power command configured")]
    NotConfigured,
    #[error("invalid power command template: {0}")]
    BadTemplate(String),
    #[error("failed to run power command: {0}")]
    Io(#[from] std::io::Error),
    #[error("power command timed out after {0}s")]
    Timeout(u64),
    #[error("power command exited with status {status}: {stderr}")]
    CommandFailed { status: i32, stderr: String },
}

/// Idempotent on/off switch addressed by a human-readable device name.
pub trait PowerSwitch: Send {
    fn set_power(&self, device: &str, on: bool) -> Result<(), ActuatorError>;
}

/// Runs a configured command template, ex:
/// `mijia-cli set --dev_name {device} --prop_name on --value {state}`.
pub struct ShellPowerSwitch {
    command_template: Option<String>,
    timeout: Duration,
}

impl ShellPowerSwitch {
    pub fn new(command_template: Option<String>, timeout_secs: u64) -> Self {
        Self { command_template, timeout: Duration::from_secs(timeout_secs) }
    }

    fn render_argv(&self, device: &str, on: bool) -> Result<Vec<String>, ActuatorError> {
        let template = self.command_template.as_deref().ok_or(ActuatorError::NotConfigured)?;
        let rendered = template
            .replace("{device}", device)
            .replace("{state}", if on { "true" } else { "false" });
        let argv = shell_words::split(&rendered)
            .map_err(|e| ActuatorError::BadTemplate(e.to_string()))?;
        if argv.is_empty() {
            return Err(ActuatorError::BadTemplate("empty command".into()));
        }
        Ok(argv)
    }
}

impl PowerSwitch for ShellPowerSwitch {
    fn set_power(&self, device: &str, on: bool) -> Result<(), ActuatorError> {
        let argv = self.render_argv(device, on)?;
        info!(device, on, command = %argv.join(" "), "invoking power switch");

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let output = wait_with_deadline(child, self.timeout)?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ActuatorError::CommandFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn wait_with_deadline(mut child: Child, timeout: Duration) -> Result<Output, ActuatorError> {
    let started = Instant::now();
    loop {
        if child.try_wait()?.is_some() {
            return Ok(child.wait_with_output()?);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ActuatorError::Timeout(timeout.as_secs()));
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_placeholders_are_substituted() {
        let switch = ShellPowerSwitch::new(
            Some("plugctl --dev '{device}' --on {state}".into()),
            5,
        );
        let argv = switch.render_argv("workshop plug", false).unwrap();
        assert_eq!(argv, vec!["plugctl", "--dev", "workshop plug", "--on", "false"]);
    }

    #[test]
    fn missing_template_is_reported() {
        let switch = ShellPowerSwitch::new(None, 5);
        assert!(matches!(
            switch.set_power("printer", false),
            Err(ActuatorError::NotConfigured)
        ));
    }

    #[test]
    fn successful_command_returns_ok() {
        let switch = ShellPowerSwitch::new(Some("echo {device} {state}".into()), 5);
        switch.set_power("printer", false).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_surfaces_exit_status() {
        let switch = ShellPowerSwitch::new(Some("false".into()), 5);
        match switch.set_power("printer", false) {
            Err(ActuatorError::CommandFailed { status, .. }) => assert_ne!(status, 0),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn hung_command_hits_the_deadline() {
        let switch = ShellPowerSwitch::new(Some("sleep 10".into()), 1);
        assert!(matches!(
            switch.set_power("printer", false),
            Err(ActuatorError::Timeout(1))
        ));
    }
}
