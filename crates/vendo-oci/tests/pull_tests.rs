//! Image and bundle pulls against an in-memory registry

use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use vendo_cache::{CacheConfig, CacheStatus, ContentCache};
use vendo_meta::version::{SemverSelection, VersionSelection};
use vendo_oci::layer::tar_layer;
use vendo_oci::registry::FetchedManifest;
use vendo_oci::{BundleFetch, Error, ImageFetch, ImageRef, MemoryRegistry, Registry};

struct Fixture {
    root: TempDir,
    registry: MemoryRegistry,
}

impl Fixture {
    fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            registry: MemoryRegistry::new(),
        }
    }

    fn dirs(&self, name: &str) -> (PathBuf, PathBuf) {
        (
            self.root.path().join(format!("work-{name}")),
            self.root.path().join(format!("dest-{name}")),
        )
    }

    fn cache(&self, max_size: u64) -> ContentCache {
        ContentCache::open(CacheConfig::new(self.root.path().join("cache"), max_size)).unwrap()
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn pulls_image_layers_in_order() {
    let fx = Fixture::new();
    let base = tar_layer(&[("etc/config", b"v1"), ("etc/old", b"old")]).unwrap();
    let top = tar_layer(&[("etc/config", b"v2"), ("etc/.wh.old", b"")]).unwrap();
    let digest = fx
        .registry
        .push_image("localhost:5000/app:1.0.0", &[], &[base, top])
        .unwrap();

    let (work, dest) = fx.dirs("image");
    let outcome = ImageFetch::new(&fx.registry, None)
        .run("localhost:5000/app:1.0.0", None, &work, &dest)
        .unwrap();

    assert_eq!(outcome.digest, digest);
    assert_eq!(outcome.url, format!("localhost:5000/app@{digest}"));
    assert_eq!(outcome.tag.as_deref(), Some("1.0.0"));
    assert_eq!(outcome.cache, CacheStatus::Disabled);
    assert_eq!(read(&dest.join("etc/config")), "v2");
    assert!(!dest.join("etc/old").exists());
}

#[test]
fn selects_highest_matching_tag() {
    let fx = Fixture::new();
    for tag in ["1.0.0", "1.4.2", "2.0.0", "1.5.0-rc.1"] {
        let layer = tar_layer(&[("version", tag.as_bytes())]).unwrap();
        fx.registry
            .push_image(&format!("localhost:5000/app:{tag}"), &[], &[layer])
            .unwrap();
    }
    let selection = VersionSelection {
        semver: Some(SemverSelection {
            constraints: "<2.0.0".to_string(),
            prereleases: None,
        }),
    };

    let (work, dest) = fx.dirs("select");
    let outcome = ImageFetch::new(&fx.registry, None)
        .run("localhost:5000/app", Some(&selection), &work, &dest)
        .unwrap();

    assert_eq!(outcome.tag.as_deref(), Some("1.4.2"));
    assert_eq!(read(&dest.join("version")), "1.4.2");
}

#[test]
fn cached_layers_are_not_pulled_again() {
    let fx = Fixture::new();
    let layer = tar_layer(&[("data.txt", b"payload")]).unwrap();
    fx.registry.push_image("localhost:5000/app:1", &[], &[layer]).unwrap();
    let cache = fx.cache(1 << 20);
    let fetch = ImageFetch::new(&fx.registry, Some(&cache));

    let (work, dest) = fx.dirs("first");
    assert_eq!(fetch.run("localhost:5000/app:1", None, &work, &dest).unwrap().cache, CacheStatus::Stored);
    let reads = fx.registry.blob_reads();

    let (work, dest) = fx.dirs("second");
    assert_eq!(fetch.run("localhost:5000/app:1", None, &work, &dest).unwrap().cache, CacheStatus::Hit);
    assert_eq!(fx.registry.blob_reads(), reads);
    assert_eq!(read(&dest.join("data.txt")), "payload");
}

#[test]
fn bundle_cache_round_trip_unbundles_without_pulls() {
    let fx = Fixture::new();
    fx.registry
        .push_bundle(
            "localhost:5000/bundle:v1",
            &[("config/app.yml", b"kind: App"), (".imgpkg/images.yml", b"images: []\n")],
        )
        .unwrap();
    let cache = fx.cache(1 << 20);
    let fetch = BundleFetch::new(&fx.registry, Some(&cache));

    let (work, dest) = fx.dirs("first");
    let first = fetch.run("localhost:5000/bundle:v1", None, false, &work, &dest).unwrap();
    assert_eq!(first.cache, CacheStatus::Stored);
    let reads = fx.registry.blob_reads();

    let (work, dest) = fx.dirs("second");
    let second = fetch.run("localhost:5000/bundle:v1", None, false, &work, &dest).unwrap();
    assert_eq!(second.cache, CacheStatus::Hit);
    assert_eq!(second.digest, first.digest);
    assert_eq!(fx.registry.blob_reads(), reads);
    assert_eq!(read(&dest.join("config/app.yml")), "kind: App");
}

#[test]
fn plain_image_is_not_a_bundle() {
    let fx = Fixture::new();
    fx.registry
        .push_image("localhost:5000/app:1", &[], &[tar_layer(&[("a", b"a")]).unwrap()])
        .unwrap();

    let (work, dest) = fx.dirs("plain");
    let err = BundleFetch::new(&fx.registry, None)
        .run("localhost:5000/app:1", None, false, &work, &dest)
        .unwrap_err();
    assert!(matches!(err, Error::NotABundle { .. }), "got {err}");
}

#[test]
fn recursive_pull_places_nested_bundles() {
    let fx = Fixture::new();
    let leaf = fx
        .registry
        .push_bundle("localhost:5000/leaf:v1", &[("leaf.txt", b"leaf")])
        .unwrap();
    let image = fx
        .registry
        .push_image("localhost:5000/plain:v1", &[], &[tar_layer(&[("bin", b"x")]).unwrap()])
        .unwrap();
    let images = format!(
        "apiVersion: imgpkg.carvel.dev/v1alpha1\nkind: ImagesLock\nimages:\n- image: localhost:5000/leaf@{leaf}\n- image: localhost:5000/plain@{image}\n"
    );
    fx.registry
        .push_bundle(
            "localhost:5000/root:v1",
            &[("root.txt", b"root"), (".imgpkg/images.yml", images.as_bytes())],
        )
        .unwrap();

    let (work, dest) = fx.dirs("recursive");
    let outcome = BundleFetch::new(&fx.registry, None)
        .run("localhost:5000/root:v1", None, true, &work, &dest)
        .unwrap();

    let leaf_dir = format!(".imgpkg/bundles/{}", leaf.replace(':', "-"));
    assert_eq!(outcome.nested.len(), 1);
    assert_eq!(outcome.nested[0].path, leaf_dir);
    assert_eq!(read(&dest.join(&leaf_dir).join("leaf.txt")), "leaf");
    assert_eq!(read(&dest.join("root.txt")), "root");
}

#[test]
fn non_recursive_pull_skips_nested_bundles() {
    let fx = Fixture::new();
    let leaf = fx
        .registry
        .push_bundle("localhost:5000/leaf:v1", &[("leaf.txt", b"leaf")])
        .unwrap();
    let images = format!("images:\n- image: localhost:5000/leaf@{leaf}\n");
    fx.registry
        .push_bundle("localhost:5000/root:v1", &[(".imgpkg/images.yml", images.as_bytes())])
        .unwrap();

    let (work, dest) = fx.dirs("flat");
    let outcome = BundleFetch::new(&fx.registry, None)
        .run("localhost:5000/root:v1", None, false, &work, &dest)
        .unwrap();
    assert!(outcome.nested.is_empty());
    assert!(!dest.join(".imgpkg/bundles").exists());
}

/// Serves every blob with one byte flipped.
struct Tampering(MemoryRegistry);

impl Registry for Tampering {
    fn manifest(&self, image: &ImageRef) -> vendo_oci::Result<FetchedManifest> {
        self.0.manifest(image)
    }

    fn blob(&self, image: &ImageRef, digest: &str, dest: &Path) -> vendo_oci::Result<()> {
        self.0.blob(image, digest, dest)?;
        let mut content = fs::read(dest).unwrap();
        content[0] ^= 0xff;
        fs::write(dest, content).unwrap();
        Ok(())
    }

    fn tags(&self, image: &ImageRef) -> vendo_oci::Result<Vec<String>> {
        self.0.tags(image)
    }
}

#[test]
fn tampered_blob_is_rejected() {
    let fx = Fixture::new();
    let registry = Tampering(MemoryRegistry::new());
    registry
        .0
        .push_image("localhost:5000/app:1", &[], &[tar_layer(&[("a", b"a")]).unwrap()])
        .unwrap();

    let (work, dest) = fx.dirs("tampered");
    let err = ImageFetch::new(&registry, None)
        .run("localhost:5000/app:1", None, &work, &dest)
        .unwrap_err();
    assert!(matches!(err, Error::DigestMismatch { .. }), "got {err}");
}

#[test]
fn pinned_digest_must_match_manifest() {
    let fx = Fixture::new();
    let digest = fx
        .registry
        .push_image("localhost:5000/app:1", &[], &[])
        .unwrap();
    let other = fx.registry.push_image("localhost:5000/app:2", &[("x", "y")], &[]).unwrap();
    assert_ne!(digest, other);

    let (work, dest) = fx.dirs("pinned");
    let outcome = ImageFetch::new(&fx.registry, None)
        .run(&format!("localhost:5000/app@{digest}"), None, &work, &dest)
        .unwrap();
    assert_eq!(outcome.digest, digest);
}
