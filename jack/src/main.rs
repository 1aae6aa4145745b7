use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;

use jackc::xml::tokens_xml;

/// Compiles Jack classes to VM code, one `.vm` file per class.
#[derive(Parser)]
#[command(version)]
struct Opts {
    /// `.jack` files, or directories whose `.jack` files are all compiled
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Write output files here instead of next to each source
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Print VM code to stdout instead of writing files
    #[arg(long)]
    stdout: bool,

    /// Also write the token stream of each class as `<Name>T.xml`
    #[arg(long)]
    tokens: bool,

    /// Also write the parse tree of each class as `<Name>.xml`
    #[arg(long)]
    xml: bool,

    /// More logging, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Opts {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn output_path(&self, source: &Path, suffix: &str) -> Result<PathBuf> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("no class name in {}", source.display()))?;
        let dir = match &self.out_dir {
            Some(dir) => dir.as_path(),
            None => source.parent().unwrap_or_else(|| Path::new("")),
        };
        Ok(dir.join(format!("{}{}", stem, suffix)))
    }
}

fn jack_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(path).with_context(|| format!("read {}", path.display()))? {
        let file = entry?.path();
        if file.is_file() && file.extension().map_or(false, |ext| ext == "jack") {
            files.push(file);
        }
    }
    files.sort();
    Ok(files)
}

fn write_output(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Compiles one file. Output files are only written for a class that
/// compiled without errors.
fn compile_file(opts: &Opts, path: &Path) -> Result<()> {
    let source = fs::read(path).with_context(|| format!("read {}", path.display()))?;

    let (class, tree) = if opts.xml {
        let (class, tree) =
            jackc::compile_with_tree(&source).with_context(|| path.display().to_string())?;
        (class, Some(tree))
    } else {
        let class = jackc::compile(&source).with_context(|| path.display().to_string())?;
        (class, None)
    };
    let tokens = if opts.tokens {
        Some(tokens_xml(&source).with_context(|| path.display().to_string())?)
    } else {
        None
    };

    if let Some(tokens) = tokens {
        write_output(&opts.output_path(path, "T.xml")?, &tokens)?;
    }
    if let Some(tree) = tree {
        write_output(&opts.output_path(path, ".xml")?, &tree)?;
    }

    let stem = path.file_stem().and_then(|s| s.to_str());
    if stem.map_or(false, |stem| stem != class.name) {
        warn!("{}: class {} does not match the file name", path.display(), class.name);
    }

    if opts.stdout {
        print!("{}", class);
    } else {
        let vm_path = opts.output_path(path, ".vm")?;
        write_output(&vm_path, &class.to_string())?;
        info!("{} -> {}", path.display(), vm_path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let opts = Opts::parse();
    if let Err(err) = SimpleLogger::new().with_level(opts.log_level()).init() {
        eprintln!("jackc: {}", err);
    }

    let mut failed = 0;
    for path in &opts.paths {
        let files = match jack_files(path) {
            Ok(files) => files,
            Err(err) => {
                error!("{:#}", err);
                failed += 1;
                continue;
            }
        };
        if files.is_empty() {
            warn!("{}: no .jack files", path.display());
        }
        for file in files {
            // a broken class never stops the rest of the batch
            if let Err(err) = compile_file(&opts, &file) {
                error!("{:#}", err);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
