use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::process;
use std::time::Instant;

use sparse_cky::{Err, Grammar, PackingKind, Parser, ParserOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} (-g GRAMMAR -l LEXICON | --load FILE) [options] < sentences

Reads one whitespace-tokenized sentence per line and prints its best parse, or
'no parse' if there isn't one.

Options:
  -h, --help      Print this message
  -g FILE         Grammar file
  -l FILE         Lexicon file
  --load FILE     Read a compiled grammar written with --save
  --save FILE     Write the compiled grammar and exit
  -p NAME         Packing function: shift, bit-vector or perfect-hash (default perfect-hash)
  -b N            Beam width per cell (default: exhaustive)
  -lb N           Beam width for span-1 cells (default: unpruned)
  -u F            Share of the span-1 beam kept for unary parents (default 0.3)
  -m N            Maximum sentence length (default 200)
  -j              Populate cells of equal width in parallel
  -s, --stats     Print grammar statistics to stderr

Set RUST_LOG=debug for per-sentence logging.",
    prog_name
  )
}

#[derive(Debug, Default)]
struct Args {
  grammar: Option<String>,
  lexicon: Option<String>,
  load: Option<String>,
  save: Option<String>,
  packing: PackingKind,
  options: ParserOptions,
  print_stats: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    let mut iter = v.into_iter();
    let prog_name = iter
      .next()
      .ok_or_else(|| Self::make_error_message("bad argument vector", "sparse-cky"))?;
    let err = |msg: &str| Self::make_error_message(msg, &prog_name);

    let mut args = Args::default();
    while let Some(o) = iter.next() {
      let mut value = |name: &str| {
        iter
          .next()
          .ok_or_else(|| err(&format!("{} needs a value", name)))
      };
      let number = |name: &str, s: String| {
        s.parse::<usize>()
          .map_err(|_| err(&format!("{} expects a number, got {}", name, s)))
      };

      match o.as_str() {
        "-h" | "--help" => {
          println!("{}", usage(&prog_name));
          process::exit(0);
        }
        "-g" => args.grammar = Some(value("-g")?),
        "-l" => args.lexicon = Some(value("-l")?),
        "--load" => args.load = Some(value("--load")?),
        "--save" => args.save = Some(value("--save")?),
        "-p" => args.packing = value("-p")?.parse().map_err(|e: String| err(&e))?,
        "-b" => args.options.beam_width = Some(number("-b", value("-b")?)?),
        "-lb" => args.options.lexical_row_beam_width = Some(number("-lb", value("-lb")?)?),
        "-u" => {
          let s = value("-u")?;
          let fraction = s
            .parse::<f32>()
            .map_err(|_| err(&format!("-u expects a fraction, got {}", s)))?;
          args.options = args.options.with_lexical_row_unary_fraction(fraction);
        }
        "-m" => args.options.max_sentence_length = number("-m", value("-m")?)?,
        "-j" => args.options.parallel = true,
        "-s" | "--stats" => args.print_stats = true,
        _ => return Err(err(&format!("invalid argument {}", o))),
      }
    }

    let given = (
      args.load.is_some(),
      args.grammar.is_some(),
      args.lexicon.is_some(),
    );
    match given {
      (true, false, false) | (false, true, true) => Ok(args),
      (true, _, _) => Err(err("--load can't be combined with -g or -l")),
      _ => Err(err("need both -g and -l, or --load")),
    }
  }
}

fn load_grammar(args: &Args) -> Result<Grammar, Err> {
  let started = Instant::now();
  let grammar = match (&args.load, &args.grammar, &args.lexicon) {
    (Some(path), _, _) => Grammar::read_binary(BufReader::new(File::open(path)?))?,
    (None, Some(grammar), Some(lexicon)) => Grammar::read_from_files(grammar, lexicon, args.packing)?,
    _ => return Err("no grammar given".into()),
  };
  info!(elapsed_ms = started.elapsed().as_millis() as u64, "grammar ready");
  Ok(grammar)
}

fn main() -> Result<(), Err> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(io::stderr)
    .init();

  let args = match Args::parse(env::args().collect()) {
    Ok(args) => args,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };

  let grammar = load_grammar(&args)?;
  if args.print_stats {
    eprintln!("{}", grammar.stats());
  }

  if let Some(path) = &args.save {
    let mut out = BufWriter::new(File::create(path)?);
    grammar.write_binary(&mut out)?;
    out.flush()?;
    info!(path = %path, "wrote compiled grammar");
    return Ok(());
  }

  let mut parser = Parser::new(&grammar, args.options.clone());
  let stdout = io::stdout();
  let mut out = stdout.lock();
  let (mut parsed, mut failed) = (0usize, 0usize);
  let started = Instant::now();

  for line in io::stdin().lock().lines() {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    match parser.parse(&line) {
      Ok(result) => {
        parsed += 1;
        writeln!(out, "{}", result.tree)?;
      }
      Err(e) => {
        failed += 1;
        writeln!(out, "no parse ({})", e)?;
      }
    }
  }

  info!(
    parsed,
    failed,
    elapsed_ms = started.elapsed().as_millis() as u64,
    "done"
  );
  Ok(())
}
