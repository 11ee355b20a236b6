mod formatter;

use std::{
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{bail, Context};
use cilgraph::{
    analysis::cfg::analyze_method_body,
    assembly::DecodeMode,
    metadata::{
        introspection::{MethodHandle, ModuleIntrospection},
        manifest::ManifestIntrospector,
        method::MethodBody,
        token::Token,
    },
};
use log::info;

pub use crate::commands::disasm::formatter::DisasmOptions;
use crate::{
    app::GlobalOptions,
    commands::{
        common::{file_display_name, is_raw_code, load_manifest, split_method_filter},
        disasm::formatter::{CilFormatter, Listing},
    },
    output::print_output,
};

pub fn run(
    path: &Path,
    method_filter: Option<&str>,
    opts: DisasmOptions,
    global: &GlobalOptions,
) -> anyhow::Result<()> {
    let listings = if is_raw_code(path) {
        if method_filter.is_some() {
            bail!("--method only applies to module manifests");
        }
        vec![raw_listing(path, &opts)?]
    } else {
        manifest_listings(path, method_filter, &opts)?
    };

    if listings.is_empty() {
        match method_filter {
            Some(filter) => bail!("no methods matching '{filter}' found"),
            None => bail!("no methods found in {}", path.display()),
        }
    }

    let fmt = CilFormatter::new(opts);
    print_output(&listings, global, |listings| {
        let stdout = io::stdout();
        let mut w = BufWriter::new(stdout.lock());
        for listing in listings {
            fmt.format_listing(&mut w, listing)?;
        }
        w.flush()?;
        Ok(())
    })
}

fn decode_mode(opts: &DisasmOptions) -> DecodeMode {
    if opts.strict {
        DecodeMode::Strict
    } else {
        DecodeMode::Permissive
    }
}

/// A file of bare method bytes, optionally with method header and exception sections.
fn raw_listing(path: &Path, opts: &DisasmOptions) -> anyhow::Result<Listing> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    let body = if opts.header {
        MethodBody::parse(&data)
            .with_context(|| format!("invalid method header in {}", path.display()))?
    } else {
        MethodBody::new(data, &[])
    };
    info!(
        "{}: {} code bytes, {} regions",
        path.display(),
        body.code.len(),
        body.regions.len()
    );

    let analysis = analyze_method_body(&body.code, body.regions, decode_mode(opts))
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(Listing::from_analysis(
        file_display_name(path),
        None,
        &analysis,
        &|_| None,
    ))
}

/// Every method of a manifest matching the optional `Type::Name` filter, in manifest order.
fn manifest_listings(
    path: &Path,
    method_filter: Option<&str>,
    opts: &DisasmOptions,
) -> anyhow::Result<Vec<Listing>> {
    let service = ManifestIntrospector::new();
    let module = load_manifest(&service, path)?;
    let filter = method_filter.map(split_method_filter);

    let resolve = |token: Token| {
        service
            .resolve_method_token(&module, token)
            .ok()
            .map(|identity| format!("{}::{}", identity.declaring_type, identity.name))
    };

    let mut listings = Vec::new();
    for method in module.methods() {
        let identity = method.identity();
        if let Some((type_filter, name)) = filter {
            if identity.name != name || type_filter.is_some_and(|t| t != identity.declaring_type)
            {
                continue;
            }
        }

        let name = format!("{}::{}", identity.declaring_type, identity.name);
        let Some(body) = service.method_body(&method) else {
            listings.push(Listing::bodiless(name, Some(method.token())));
            continue;
        };

        let analysis = analyze_method_body(&body.code, body.regions, decode_mode(opts))
            .with_context(|| format!("failed to decode {name}"))?;
        listings.push(Listing::from_analysis(
            name,
            Some(method.token()),
            &analysis,
            &resolve,
        ));
    }

    Ok(listings)
}
