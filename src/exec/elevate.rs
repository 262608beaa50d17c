// ABOUTME: Privilege elevation command wrapping.
// ABOUTME: Builds sudo invocations with a per-run prompt marker for the scanner.

use rand::Rng;

/// A command rewritten to run under another user, plus the prompt marker
/// that identifies the password request on the wire.
#[derive(Debug, Clone)]
pub struct ElevatedCommand {
    pub command: String,
    pub prompt: String,
}

/// Rewrites commands to run with elevated privileges.
pub trait Elevator: Send + Sync {
    fn wrap(&self, command: &str, target_user: &str, shell: Option<&str>) -> ElevatedCommand;
}

/// The sudo elevation strategy.
pub struct Sudo {
    exe: String,
    flags: Vec<String>,
}

impl Default for Sudo {
    fn default() -> Self {
        Self {
            exe: "sudo".to_string(),
            flags: vec!["-H".to_string()],
        }
    }
}

impl Sudo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Elevator for Sudo {
    fn wrap(&self, command: &str, target_user: &str, shell: Option<&str>) -> ElevatedCommand {
        // A random marker keeps remote output from being mistaken for the
        // prompt.
        let prompt = format!("[sudo via legate, key={}] password: ", prompt_nonce());
        let shell = shell.unwrap_or("$SHELL");
        let flags = self.flags.join(" ");
        let inner = format!(
            "{exe} -k && {exe} {flags} -S -p \"{prompt}\" -u {target_user} {shell} -c {command}",
            exe = self.exe,
            command = shell_quote(command),
        );
        ElevatedCommand {
            command: format!("/bin/sh -c {}", shell_quote(&inner)),
            prompt,
        }
    }
}

fn prompt_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..32).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}

/// Quote a string for the remote POSIX shell.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
