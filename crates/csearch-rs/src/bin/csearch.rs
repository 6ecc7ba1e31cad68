// Copyright 2025 the csearch-rs authors
// Derived from Google Code Search (github.com/google/codesearch)
// Copyright 2011 The Go Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use regex::bytes::Regex;

use csearch_rs::index::{self, Index};
use csearch_rs::query::{self, Query};

/// csearch behaves like grep over all indexed files.
///
/// The regular expression is planned into a boolean trigram query, the
/// index prunes the corpus to candidate files, and only those are
/// actually searched. The index must have been built beforehand with
/// cindex; its location comes from --index or $CSEARCHINDEX, else the
/// nearest .csearchindex up from the working directory.
#[derive(Parser, Debug)]
#[command(
    name = "csearch",
    version,
    about = "Grep over all indexed files using a trigram index",
    disable_help_flag = true
)]
struct Args {
    /// RE2-style regular expression to search for
    regexp: String,

    /// Search only files with names matching this regexp
    #[arg(short = 'f', value_name = "FILEREGEXP")]
    file: Option<String>,

    /// Case-insensitive search
    #[arg(short = 'i')]
    ignore_case: bool,

    /// Print only the names of matching files
    #[arg(short = 'l')]
    list: bool,

    /// Print only a count of matching lines per file
    #[arg(short = 'c')]
    count: bool,

    /// Print line numbers
    #[arg(short = 'n')]
    line_numbers: bool,

    /// Omit file names in the output
    #[arg(short = 'h')]
    no_filename: bool,

    /// Search every file in the index, skipping the trigram filter
    #[arg(long)]
    brute: bool,

    /// Path to the index file
    #[arg(long)]
    index: Option<PathBuf>,

    /// Emit matches as newline-delimited JSON
    #[arg(long)]
    json: bool,

    /// Print extra information
    #[arg(long)]
    verbose: bool,

    /// Print help
    #[arg(long, action = clap::ArgAction::HelpLong)]
    help: Option<bool>,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut pattern = args.regexp.clone();
    if args.ignore_case {
        pattern = format!("(?i){}", pattern);
    }
    let re = Regex::new(&format!("(?m){}", pattern))
        .with_context(|| format!("parse regexp {:?}", args.regexp))?;

    let q = if args.brute {
        Query::all()
    } else {
        query::plan(&pattern).with_context(|| format!("plan regexp {:?}", args.regexp))?
    };
    if args.verbose {
        info!("query: {}", q);
    }

    let index_path = args.index.clone().unwrap_or_else(index::search_path);
    let mut ix = Index::open(&index_path)
        .with_context(|| format!("open index {}", index_path.display()))?;
    ix.verbose = args.verbose;

    let mut post = ix.posting_query(&q)?;
    if args.verbose {
        info!("identified {} possible files", post.len());
    }

    if let Some(f) = &args.file {
        let fre = regex::Regex::new(f).with_context(|| format!("parse -f regexp {:?}", f))?;
        let mut filtered = Vec::with_capacity(post.len());
        for id in post {
            if fre.is_match(&ix.name(id)?) {
                filtered.push(id);
            }
        }
        if args.verbose {
            info!("filename regexp matched {} files", filtered.len());
        }
        post = filtered;
    }

    let mut matched = false;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for id in post {
        let name = ix.name(id)?;
        match grep_file(&mut out, &re, &name, &args) {
            Ok(any) => matched |= any,
            Err(err) => error!("{}: {}", name, err),
        }
    }
    Ok(if matched { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

/// Line-oriented match over one candidate file. Returns whether anything
/// matched.
fn grep_file(out: &mut impl Write, re: &Regex, name: &str, args: &Args) -> Result<bool> {
    let data = std::fs::read(name)?;
    if data.is_empty() {
        return Ok(false);
    }
    // A trailing newline does not open a final empty line.
    let body = match data.last() {
        Some(b'\n') => &data[..data.len() - 1],
        _ => &data[..],
    };

    let mut count: u64 = 0;
    let mut line_num: u64 = 0;
    for line in body.split(|&b| b == b'\n') {
        line_num += 1;
        if !re.is_match(line) {
            continue;
        }
        count += 1;
        if args.list {
            writeln!(out, "{}", name)?;
            return Ok(true);
        }
        if args.count {
            continue;
        }
        let text = String::from_utf8_lossy(line);
        if args.json {
            writeln!(
                out,
                "{}",
                serde_json::json!({ "path": name, "line": line_num, "text": text })
            )?;
        } else {
            match (args.no_filename, args.line_numbers) {
                (false, true) => writeln!(out, "{}:{}:{}", name, line_num, text)?,
                (false, false) => writeln!(out, "{}:{}", name, text)?,
                (true, true) => writeln!(out, "{}:{}", line_num, text)?,
                (true, false) => writeln!(out, "{}", text)?,
            }
        }
    }
    if args.count && count > 0 {
        writeln!(out, "{}:{}", name, count)?;
    }
    Ok(count > 0)
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
