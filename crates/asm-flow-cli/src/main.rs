use std::{
    error::Error,
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use asm_flow::{AsmError, Assembler, FileId, ForSyntax, FsLoader, Options, ResourceLimits, Span};
use clap::Parser;
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Assembly source file
    source: PathBuf,

    /// Listing output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pre-defined symbols (repeatable)
    #[arg(short = 'D', long, value_name = "NAME=VALUE", value_parser = parse_define)]
    define: Vec<(String, i64)>,

    /// Search directories for included files
    #[arg(short = 'I', long)]
    include: Vec<PathBuf>,

    /// Maximum `!source` nesting depth
    #[arg(long, default_value_t = ResourceLimits::default().max_source_depth)]
    max_depth: usize,

    /// Prefer the old `!for VAR, END` form and advise on the new one
    #[arg(long)]
    legacy_for: bool,

    /// Append the defined global symbols to the listing
    #[arg(long)]
    symbols: bool,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, default_value_t = Level::WARN)]
    log_level: Level,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = main_real(args) {
        tracing::error!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_real(args: Args) -> Result<(), Box<dyn Error>> {
    let loader = args
        .include
        .iter()
        .fold(FsLoader::new(), |loader, dir| loader.include_dir(dir));

    let mut asm = Assembler::new();
    asm.with_loader(loader)
        .limits(ResourceLimits {
            max_source_depth: args.max_depth,
            ..ResourceLimits::default()
        })
        .options(Options {
            for_syntax: if args.legacy_for {
                ForSyntax::Legacy
            } else {
                ForSyntax::Current
            },
        });
    for (name, value) in &args.define {
        asm.define(name, *value);
    }

    let result = match asm.assemble_file(&args.source) {
        Ok(result) => result,
        Err(err) => {
            let errors = err.into_errors();
            for e in &errors {
                eprintln!("{}", describe(&asm, e));
            }
            return Err(format!("{} error(s) in {}", errors.len(), args.source.display()).into());
        }
    };

    for diag in result.diagnostics() {
        eprintln!(
            "{}: {}: {}",
            location(|file| result.file_name(file).map(|p| p.display().to_string()), diag.span),
            diag.severity,
            diag.message
        );
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| format!("cannot create {}: {e}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    out.write_all(result.listing().as_bytes())?;
    if args.symbols {
        for (name, value) in result.symbols() {
            writeln!(out, "{name:<16} = ${value:04x} ({value})")?;
        }
    }
    out.flush()?;
    tracing::info!(
        passes = result.passes(),
        statements = result.statements().len(),
        "done"
    );
    Ok(())
}

fn describe(asm: &Assembler, err: &AsmError) -> String {
    match err.span() {
        Some(span) => format!(
            "{}: {}: {err}",
            location(|file| asm.file_name(file).map(|p| p.display().to_string()), span),
            err.severity()
        ),
        None => format!("{}: {err}", err.severity()),
    }
}

fn location(name: impl Fn(FileId) -> Option<String>, span: Span) -> String {
    let file = name(span.file).unwrap_or_else(|| String::from("<unknown>"));
    format!("{file}:{}", span.line)
}

/// `NAME=VALUE` with a decimal, `$hex`, `0x` hex or `%binary` value.
/// A bare `NAME` defines it as 1.
fn parse_define(s: &str) -> Result<(String, i64), String> {
    let (name, value) = match s.split_once('=') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (s.trim(), "1"),
    };
    if name.is_empty() {
        return Err(format!("missing symbol name in `{s}`"));
    }
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", value),
    };
    let (digits, radix) = if let Some(hex) = digits.strip_prefix('$') {
        (hex, 16)
    } else if let Some(hex) = digits.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(bin) = digits.strip_prefix('%') {
        (bin, 2)
    } else {
        (digits, 10)
    };
    if digits.starts_with(['-', '+']) {
        return Err(format!("invalid value `{value}` for {name}: misplaced sign"));
    }
    let value = i64::from_str_radix(&format!("{sign}{digits}"), radix)
        .map_err(|e| format!("invalid value `{value}` for {name}: {e}"))?;
    Ok((name.to_owned(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_forms() {
        assert_eq!(parse_define("DEBUG"), Ok(("DEBUG".into(), 1)));
        assert_eq!(parse_define("SIZE=32"), Ok(("SIZE".into(), 32)));
        assert_eq!(parse_define("BASE=$c000"), Ok(("BASE".into(), 0xc000)));
        assert_eq!(parse_define("MASK=0xff"), Ok(("MASK".into(), 0xff)));
        assert_eq!(parse_define("BITS=%1010"), Ok(("BITS".into(), 10)));
        assert_eq!(parse_define("OFF=-4"), Ok(("OFF".into(), -4)));
    }

    #[test]
    fn define_errors() {
        assert!(parse_define("=3").is_err());
        assert!(parse_define("X=abc").is_err());
        assert!(parse_define("X=").is_err());
    }

    #[test]
    fn define_extreme_values() {
        assert_eq!(
            parse_define("X=-9223372036854775808"),
            Ok(("X".into(), i64::MIN))
        );
        assert_eq!(parse_define("X=-$8000000000000000"), Ok(("X".into(), i64::MIN)));
        assert!(parse_define("X=--9223372036854775808").is_err());
        assert!(parse_define("X=-+1").is_err());
        assert!(parse_define("X=9223372036854775808").is_err());
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from([
            "asm-flow",
            "main.a",
            "-D",
            "A=1",
            "-I",
            "lib",
            "--max-depth",
            "8",
            "--legacy-for",
        ])
        .unwrap();
        assert_eq!(args.define, [("A".to_string(), 1)]);
        assert_eq!(args.include, [PathBuf::from("lib")]);
        assert_eq!(args.max_depth, 8);
        assert!(args.legacy_for);
        assert!(!args.symbols);
    }
}
