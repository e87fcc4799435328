//! Throwaway OpenPGP keys for signature tests.
//!
//! Keys live in a private `GNUPGHOME` that is deleted with the fixture.
//! Tests must skip when [`GpgHome::new`] returns `None` (no `gpg` on PATH).

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

#[derive(Debug)]
pub struct GpgHome {
    dir: TempDir,
}

impl GpgHome {
    /// Create an isolated keyring, or `None` if `gpg` is not installed.
    pub fn new() -> Option<Self> {
        let available = Command::new("gpg")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success());
        if !available {
            return None;
        }
        // Short path: gpg-agent socket paths have a length limit
        let dir = tempfile::Builder::new()
            .prefix("gpg")
            .tempdir_in("/tmp")
            .or_else(|_| tempfile::tempdir())
            .unwrap_or_else(|e| panic!("GpgHome: failed to create home: {e}"));
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700));
        }
        Some(Self { dir })
    }

    pub fn home(&self) -> &Path {
        self.dir.path()
    }

    fn gpg(&self, args: &[&str]) -> String {
        let output = Command::new("gpg")
            .args(["--batch", "--pinentry-mode", "loopback", "--passphrase", ""])
            .args(args)
            .env("GNUPGHOME", self.home())
            .output()
            .unwrap_or_else(|e| panic!("failed to run `gpg {args:?}`: {e}"));
        if !output.status.success() {
            panic!(
                "`gpg {args:?}` failed:\n{}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    /// Generate a signing key for `email`. Returns its fingerprint.
    pub fn generate_key(&self, name: &str, email: &str) -> String {
        let uid = format!("{name} <{email}>");
        self.gpg(&["--quick-gen-key", &uid, "rsa2048", "sign", "never"]);
        let listing = self.gpg(&["--list-keys", "--with-colons", email]);
        listing
            .lines()
            .find_map(|line| line.strip_prefix("fpr:"))
            .and_then(|rest| rest.split(':').find(|field| !field.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| panic!("GpgHome: no fingerprint for {email} in:\n{listing}"))
    }

    /// ASCII-armored public key for `fingerprint`.
    pub fn export_public(&self, fingerprint: &str) -> String {
        self.gpg(&["--armor", "--export", fingerprint])
    }
}
