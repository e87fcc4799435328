//! Image and bundle sources

use std::path::Path;

use vendo_meta::schema::{BundleLock, ImageLock, ResourceRef};
use vendo_meta::{BundleSource, ImageSource, LockedSource};
use vendo_oci::{BundleFetch, HttpRegistry, ImageFetch, Registry, RegistryCredentials, RegistryOptions};

use super::{CacheEvent, FetchContext, FetchResult};
use crate::Result;

/// Run `f` against the configured registry, or a network registry built
/// from the source's credentials.
fn with_registry<T>(
    ctx: &FetchContext<'_>,
    secret_ref: Option<&ResourceRef>,
    insecure: bool,
    f: impl FnOnce(&dyn Registry) -> Result<T>,
) -> Result<T> {
    if let Some(registry) = ctx.registry {
        return f(registry);
    }
    let credentials = match secret_ref {
        Some(secret) => RegistryCredentials::from_entries(&ctx.secret_entries(&secret.name)?),
        None => None,
    };
    let registry = HttpRegistry::new(RegistryOptions {
        credentials,
        insecure_skip_tls_verify: insecure,
    });
    f(&registry)
}

pub(super) fn fetch_image(
    ctx: &FetchContext<'_>,
    image: &ImageSource,
    work: &Path,
    dest: &Path,
) -> Result<FetchResult> {
    let outcome = with_registry(ctx, image.secret_ref.as_ref(), image.dangerous_skip_tls_verify, |registry| {
        Ok(ImageFetch::new(registry, ctx.cache).run(&image.url, image.tag_selection.as_ref(), work, dest)?)
    })?;
    tracing::info!(image = %outcome.url, "Fetched image");

    Ok(FetchResult::remote(
        LockedSource::Image(ImageLock {
            url: outcome.url.clone(),
            tag: outcome.tag,
        }),
        vec![CacheEvent {
            subject: outcome.url,
            status: outcome.cache,
        }],
    ))
}

pub(super) fn fetch_bundle(
    ctx: &FetchContext<'_>,
    bundle: &BundleSource,
    work: &Path,
    dest: &Path,
) -> Result<FetchResult> {
    let outcome = with_registry(ctx, bundle.secret_ref.as_ref(), bundle.dangerous_skip_tls_verify, |registry| {
        Ok(BundleFetch::new(registry, ctx.cache).run(
            &bundle.image,
            bundle.tag_selection.as_ref(),
            bundle.recursive,
            work,
            dest,
        )?)
    })?;
    tracing::info!(bundle = %outcome.url, nested = outcome.nested.len(), "Fetched bundle");

    let mut events = vec![CacheEvent {
        subject: outcome.url.clone(),
        status: outcome.cache,
    }];
    events.extend(outcome.nested.into_iter().map(|nested| CacheEvent {
        subject: nested.url,
        status: nested.cache,
    }));

    Ok(FetchResult::remote(
        LockedSource::ImgpkgBundle(BundleLock {
            image: outcome.url,
            tag: outcome.tag,
        }),
        events,
    ))
}
