// Copyright 2025 the csearch-rs authors
// Derived from Google Code Search (github.com/google/codesearch)
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info};

use csearch_rs::index::{self, Index, IndexWriter};
use csearch_rs::walk;
use csearch_rs::Error;

/// cindex prepares the trigram index used by csearch.
///
/// Each named path (file or directory tree) is added to the index, which
/// lives at the file named by --index or $CSEARCHINDEX, defaulting to
/// ~/.csearchindex. With no paths, the already-registered paths are
/// reindexed, so a bare `cindex` works as a nightly refresh. By default
/// new paths are merged over whatever the index already covers; --reset
/// discards the old index first.
#[derive(Parser, Debug)]
#[command(name = "cindex", version, about = "Build or update the trigram index used by csearch")]
struct Args {
    /// File or directory trees to add to the index
    paths: Vec<PathBuf>,

    /// List indexed paths and exit
    #[arg(long)]
    list: bool,

    /// Discard the existing index before indexing
    #[arg(long)]
    reset: bool,

    /// Path to the index file
    #[arg(long)]
    index: Option<PathBuf>,

    /// Log information about skipped files
    #[arg(long)]
    logskip: bool,

    /// Print extra information
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let mut args = Args::parse();
    init_logging(args.verbose);

    let primary = match &args.index {
        Some(p) => {
            if p.is_dir() {
                p.join(".csearchindex")
            } else {
                p.clone()
            }
        }
        None => index::search_path(),
    };

    if args.list {
        let ix = Index::open(&primary)
            .with_context(|| format!("open index {}", primary.display()))?;
        for p in ix.paths()? {
            println!("{}", p);
        }
        return Ok(());
    }

    if args.reset && args.paths.is_empty() {
        match std::fs::remove_file(&primary) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err).context("remove index"),
        }
        return Ok(());
    }

    if args.paths.is_empty() {
        let ix = Index::open(&primary)
            .with_context(|| format!("open index {}", primary.display()))?;
        args.paths = ix.paths()?.into_iter().map(PathBuf::from).collect();
    }

    // Absolute, sorted roots, so the files walk out in name order.
    let mut roots: Vec<String> = Vec::new();
    for p in &args.paths {
        match std::path::absolute(p) {
            Ok(a) => roots.push(a.to_string_lossy().into_owned()),
            Err(err) => error!("{}: {}", p.display(), err),
        }
    }
    roots.sort();
    roots.dedup();

    match std::fs::metadata(&primary) {
        Err(_) => args.reset = true, // no index yet
        Ok(m) if m.is_dir() => bail!("index {}: path is a directory", primary.display()),
        Ok(_) => {}
    }

    // Without --reset, build next to the primary index and merge over it.
    let file = if args.reset {
        primary.clone()
    } else {
        append_tilde(&primary)
    };

    let mut ix = IndexWriter::create(&file)
        .with_context(|| format!("create index {}", file.display()))?;
    ix.log_skip = args.logskip || args.verbose;
    ix.verbose = args.verbose;
    ix.add_paths(roots.iter().cloned());
    for root in &roots {
        info!("index {}", root);
        for path in walk::files(Path::new(root)) {
            match ix.add_file(&path) {
                Ok(()) => {}
                Err(Error::Io(ref err)) if err.kind() == io::ErrorKind::PermissionDenied => {
                    error!("{}: {}", path.display(), err);
                }
                Err(err) => return Err(err).with_context(|| path.display().to_string()),
            }
        }
    }
    info!("flush index");
    ix.flush()?;

    if !args.reset {
        info!("merge {} {}", primary.display(), file.display());
        let dst = append_tilde(&file);
        index::merge(&dst, &primary, &file)?;
        std::fs::remove_file(&file)?;
        std::fs::rename(&dst, &primary)?;
    }
    info!("done");
    Ok(())
}

fn append_tilde(path: &Path) -> PathBuf {
    let mut os = path.to_path_buf().into_os_string();
    os.push("~");
    PathBuf::from(os)
}

fn init_logging(verbose: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
