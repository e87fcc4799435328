//! Signature verification of fetched references using real gpg signatures
//!
//! Skipped when `gpg` is not installed.

use tempfile::TempDir;
use vendo_git::{Error, GitFetch, Verifier};
use vendo_test_utils::git::Upstream;
use vendo_test_utils::gpg::GpgHome;

struct Keys {
    gpg: GpgHome,
    trusted: String,
    stranger: String,
}

fn keys() -> Option<Keys> {
    let Some(gpg) = GpgHome::new() else {
        eprintln!("gpg not available; skipping");
        return None;
    };
    let trusted = gpg.generate_key("Trusted", "trusted@example.com");
    let stranger = gpg.generate_key("Stranger", "stranger@example.com");
    Some(Keys {
        gpg,
        trusted,
        stranger,
    })
}

fn verifier(keys: &Keys, fingerprints: &[&str]) -> Verifier {
    let armored: Vec<(String, String)> = fingerprints
        .iter()
        .map(|fpr| (format!("{fpr}.pub"), keys.gpg.export_public(fpr)))
        .collect();
    Verifier::from_armored(armored.iter().map(|(n, k)| (n.as_str(), k.as_str()))).unwrap()
}

fn fetch(upstream: &Upstream, reference: &str, verifier: &Verifier, root: &TempDir) -> vendo_git::Result<()> {
    let url = upstream.url();
    let mut fetch = GitFetch::new(&url);
    fetch.reference = Some(reference);
    fetch.verifier = Some(verifier);
    let dest = root.path().join(format!("dest-{reference}"));
    let result = fetch.run(&root.path().join(format!("work-{reference}")), &dest);
    if result.is_err() {
        assert!(!dest.exists(), "failed verification must not populate destination");
    }
    result.map(|_| ())
}

#[test]
fn signed_commit_and_tag_by_trusted_key_pass() {
    let Some(keys) = keys() else { return };
    let root = TempDir::new().unwrap();
    let upstream = Upstream::init(&root.path().join("upstream"));
    upstream.signed_commit(&[("a", "a")], "Signed", &keys.gpg, &keys.trusted);
    upstream.signed_tag("v1.0.0", "Signed tag", &keys.gpg, &keys.trusted);

    // Stranger listed first: order must not matter
    let verifier = verifier(&keys, &[&keys.stranger, &keys.trusted]);
    fetch(&upstream, "main", &verifier, &root).unwrap();
    fetch(&upstream, "v1.0.0", &verifier, &root).unwrap();
}

#[test]
fn signed_by_stranger_is_unknown_signer() {
    let Some(keys) = keys() else { return };
    let root = TempDir::new().unwrap();
    let upstream = Upstream::init(&root.path().join("upstream"));
    upstream.signed_commit(&[("a", "a")], "Signed", &keys.gpg, &keys.stranger);
    upstream.signed_tag("v1.0.0", "Signed tag", &keys.gpg, &keys.stranger);

    let verifier = verifier(&keys, &[&keys.trusted]);
    for reference in ["main", "v1.0.0"] {
        let err = fetch(&upstream, reference, &verifier, &root).unwrap_err();
        assert!(matches!(err, Error::UnknownSigner { .. }), "{reference}: {err}");
        assert!(err.to_string().contains("openpgp: signature made by unknown entity"));
    }
}

#[test]
fn unsigned_commit_and_tag_are_missing_signature() {
    let Some(keys) = keys() else { return };
    let root = TempDir::new().unwrap();
    let upstream = Upstream::init(&root.path().join("upstream"));
    upstream.commit(&[("a", "a")], "Unsigned");
    upstream.annotated_tag("v1.0.0", "Unsigned tag");

    let verifier = verifier(&keys, &[&keys.trusted]);

    let err = fetch(&upstream, "main", &verifier, &root).unwrap_err();
    assert!(err.to_string().contains("Expected to find commit signature:"));
    assert!(err.to_string().contains("Expected to find section 'PGP SIGNATURE', but did not"));

    let err = fetch(&upstream, "v1.0.0", &verifier, &root).unwrap_err();
    assert!(err.to_string().contains("Expected to find tag signature:"));
    assert!(matches!(err, Error::MissingSignature { .. }));
}

#[test]
fn concatenated_keys_in_one_entry_are_all_trusted() {
    let Some(keys) = keys() else { return };
    let root = TempDir::new().unwrap();
    let upstream = Upstream::init(&root.path().join("upstream"));
    upstream.signed_commit(&[("a", "a")], "Signed", &keys.gpg, &keys.trusted);

    let bundle = format!(
        "{}\n\n{}",
        keys.gpg.export_public(&keys.stranger),
        keys.gpg.export_public(&keys.trusted)
    );
    let verifier = Verifier::from_armored([("valid.pub", bundle.as_str())]).unwrap();
    assert_eq!(verifier.len(), 2);

    fetch(&upstream, "main", &verifier, &root).unwrap();
}

#[test]
fn signed_tag_on_unsigned_commit_passes() {
    let Some(keys) = keys() else { return };
    let root = TempDir::new().unwrap();
    let upstream = Upstream::init(&root.path().join("upstream"));
    upstream.commit(&[("a", "a")], "Unsigned");
    upstream.signed_tag("v1.0.0", "Signed tag", &keys.gpg, &keys.trusted);

    let verifier = verifier(&keys, &[&keys.trusted]);
    fetch(&upstream, "v1.0.0", &verifier, &root).unwrap();

    // The commit itself carries no signature
    let err = fetch(&upstream, "main", &verifier, &root).unwrap_err();
    assert!(matches!(err, Error::MissingSignature { .. }), "{err}");
}
