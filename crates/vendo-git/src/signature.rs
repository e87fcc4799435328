//! Extraction of embedded PGP signatures from raw git objects
//!
//! Commits carry the signature in a `gpgsig` header whose continuation lines
//! start with a single space; the signed payload is the commit with that
//! header removed. Tags append the armored signature after the message; the
//! payload is everything before it.

use std::fmt;

use crate::{Error, Result};

const COMMIT_SIGNATURE_HEADER: &str = "gpgsig ";
const SIGNATURE_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Commit,
    Tag,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => f.write_str("commit"),
            Self::Tag => f.write_str("tag"),
        }
    }
}

/// A git object split into the bytes that were signed and the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject {
    pub kind: ObjectKind,
    pub payload: Vec<u8>,
    /// ASCII-armored detached signature
    pub signature: String,
}

impl SignedObject {
    /// Split a raw object body (as stored in the object database).
    ///
    /// # Errors
    ///
    /// [`Error::MissingSignature`] when the object carries no signature.
    pub fn extract(kind: ObjectKind, raw: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(raw);
        let parsed = match kind {
            ObjectKind::Commit => split_commit(&text),
            ObjectKind::Tag => split_tag(&text),
        };
        let (payload, signature) = parsed.ok_or(Error::MissingSignature { kind })?;
        Ok(Self {
            kind,
            payload: payload.into_bytes(),
            signature,
        })
    }
}

fn split_commit(text: &str) -> Option<(String, String)> {
    let header_end = text.find("\n\n").map(|i| i + 1).unwrap_or(text.len());
    let (headers, message) = text.split_at(header_end);

    let mut payload = String::with_capacity(text.len());
    let mut signature: Option<String> = None;
    let mut in_signature = false;

    for line in headers.split_inclusive('\n') {
        if in_signature {
            if let Some(continuation) = line.strip_prefix(' ') {
                if let Some(sig) = signature.as_mut() {
                    sig.push_str(continuation);
                }
                continue;
            }
            in_signature = false;
        }
        if signature.is_none()
            && let Some(first) = line.strip_prefix(COMMIT_SIGNATURE_HEADER)
        {
            signature = Some(first.to_string());
            in_signature = true;
            continue;
        }
        payload.push_str(line);
    }
    payload.push_str(message);

    let signature = signature?;
    signature
        .contains(SIGNATURE_BEGIN)
        .then(|| (payload, signature.trim_end().to_string() + "\n"))
}

fn split_tag(text: &str) -> Option<(String, String)> {
    let start = if text.starts_with(SIGNATURE_BEGIN) {
        0
    } else {
        text.find(&format!("\n{SIGNATURE_BEGIN}"))? + 1
    };
    let (payload, signature) = text.split_at(start);
    Some((payload.to_string(), signature.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SIGNED_COMMIT: &str = "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A <a@example.com> 1700000000 +0000\n\
committer A <a@example.com> 1700000000 +0000\n\
gpgsig -----BEGIN PGP SIGNATURE-----\n \n iQEzBAABCAAdFiEE\n =abcd\n -----END PGP SIGNATURE-----\n\
\n\
Signed commit\n";

    #[test]
    fn commit_signature_is_removed_from_payload() {
        let object = SignedObject::extract(ObjectKind::Commit, SIGNED_COMMIT.as_bytes()).unwrap();
        assert_eq!(
            String::from_utf8(object.payload).unwrap(),
            "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
author A <a@example.com> 1700000000 +0000\n\
committer A <a@example.com> 1700000000 +0000\n\
\n\
Signed commit\n"
        );
        assert_eq!(
            object.signature,
            "-----BEGIN PGP SIGNATURE-----\n\niQEzBAABCAAdFiEE\n=abcd\n-----END PGP SIGNATURE-----\n"
        );
    }

    #[test]
    fn unsigned_commit_reports_missing_section() {
        let raw = "tree abc\nauthor A <a@example.com> 1 +0000\n\nmsg\n";
        let err = SignedObject::extract(ObjectKind::Commit, raw.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MissingSignature { kind: ObjectKind::Commit }));
        let message = err.to_string();
        assert!(message.contains("Expected to find commit signature:"));
        assert!(message.contains("Expected to find section 'PGP SIGNATURE', but did not"));
    }

    #[test]
    fn signature_text_in_commit_message_is_ignored() {
        let raw = format!("tree abc\n\nmessage quoting\n{SIGNATURE_BEGIN}\n");
        assert!(SignedObject::extract(ObjectKind::Commit, raw.as_bytes()).is_err());
    }

    #[test]
    fn tag_signature_trails_message() {
        let raw = format!(
            "object abc\ntype commit\ntag v1\ntagger A <a@example.com> 1 +0000\n\nRelease\n{SIGNATURE_BEGIN}\n\nabc\n-----END PGP SIGNATURE-----\n"
        );
        let object = SignedObject::extract(ObjectKind::Tag, raw.as_bytes()).unwrap();
        assert!(String::from_utf8(object.payload).unwrap().ends_with("Release\n"));
        assert!(object.signature.starts_with(SIGNATURE_BEGIN));
    }

    #[test]
    fn unsigned_tag_reports_missing_section() {
        let raw = "object abc\ntype commit\ntag v1\n\nRelease\n";
        let err = SignedObject::extract(ObjectKind::Tag, raw.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Expected to find tag signature:"));
    }
}
