use bytegraph::code::{self, CodeArena, Constant, Pools, RawCode, VersionProfile};

use clap::{crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::fmt;

fn main() {
    env_logger::init();

    let matches = Command::new("bytegraph")
        .version(crate_version!())
        .about("Decodes, edits, and re-encodes stack machine wordcode")
        .subcommand_required(true)
        .subcommand(
            Command::new("disasm")
                .about("Print a listing of the decoded instructions")
                .args(code_args()),
        )
        .subcommand(
            Command::new("roundtrip")
                .about("Decode then encode without edits, checking the output is identical")
                .args(code_args()),
        )
        .subcommand(
            Command::new("optimise")
                .about("Inline unconditional jumps and drop no-ops, then encode")
                .args(code_args()),
        )
        .subcommand(
            Command::new("trace")
                .about("Trace which instructions produce or consume a stack value")
                .args(code_args())
                .arg(
                    Arg::new("offset")
                        .long("offset")
                        .value_name("OFFSET")
                        .help("Byte offset of the instruction to trace from")
                        .required(true)
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("depth")
                        .long("depth")
                        .value_name("DEPTH")
                        .help("Stack slot to trace, counted from the top")
                        .default_value("0")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("consumers")
                        .long("consumers")
                        .help("Trace forward to consumers instead of backwards to producers")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("disasm", sub)) => disasm(sub),
        Some(("roundtrip", sub)) => roundtrip(sub),
        Some(("optimise", sub)) => optimise(sub),
        Some(("trace", sub)) => trace(sub),
        _ => Err(CliError::Usage(String::from("unknown subcommand"))),
    };
    if let Err(err) = result {
        log::error!("{}", err);
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

/// Arguments describing the code object to work on
fn code_args() -> Vec<Arg> {
    let pool = |name: &'static str, value: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .value_name(value)
            .help(help)
            .value_delimiter(',')
            .action(ArgAction::Append)
    };
    vec![
        Arg::new("profile")
            .long("profile")
            .value_name("PROFILE")
            .help("Interpreter version the code is for (py38, py310)")
            .default_value("py38")
            .action(ArgAction::Set),
        pool("consts", "CONST", "Constants pool (None, True, 1, 2.5, 'text', b'bytes', ...)"),
        pool("names", "NAME", "Global and attribute names pool"),
        pool("varnames", "NAME", "Local variables pool"),
        pool("cellvars", "NAME", "Cell variables pool"),
        pool("freevars", "NAME", "Free variables pool"),
        Arg::new("lnotab")
            .long("lnotab")
            .value_name("HEX")
            .help("Line table, as hex")
            .action(ArgAction::Set),
        Arg::new("firstlineno")
            .long("firstlineno")
            .value_name("LINE")
            .default_value("1")
            .action(ArgAction::Set)
            .value_parser(value_parser!(u32)),
        Arg::new("CODE")
            .help("Code stream, as hex")
            .required(true)
            .index(1),
    ]
}

#[derive(Debug)]
enum CliError {
    Usage(String),
    Code(code::Error),
    Mismatch { expected: String, found: String },
}

impl From<code::Error> for CliError {
    fn from(err: code::Error) -> CliError {
        CliError::Code(err)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Code(err) => write!(f, "{}", err),
            CliError::Mismatch { expected, found } => {
                write!(f, "round trip changed the code: expected {}, got {}", expected, found)
            }
        }
    }
}

fn profile(matches: &ArgMatches) -> Result<VersionProfile, CliError> {
    let name = matches
        .get_one::<String>("profile")
        .map_or("py38", String::as_str);
    VersionProfile::by_name(name)
        .ok_or_else(|| CliError::Usage(format!("unknown profile '{}'", name)))
}

fn raw_code(matches: &ArgMatches) -> Result<RawCode, CliError> {
    let strings = |name: &str| -> Vec<String> {
        matches
            .get_many::<String>(name)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };
    let constants = strings("consts")
        .iter()
        .map(|constant| parse_constant(constant))
        .collect::<Result<Vec<Constant>, CliError>>()?;
    let pools = Pools {
        constants,
        names: strings("names"),
        locals: strings("varnames"),
        cells: strings("cellvars"),
        free: strings("freevars"),
    };

    let code = match matches.get_one::<String>("CODE") {
        Some(code) => parse_hex(code)?,
        None => return Err(CliError::Usage(String::from("missing code"))),
    };
    let mut raw = RawCode::new(code, pools);
    if let Some(table) = matches.get_one::<String>("lnotab") {
        raw.line_table = parse_hex(table)?;
    }
    if let Some(line) = matches.get_one::<u32>("firstlineno") {
        raw.header.firstlineno = *line;
    }
    Ok(raw)
}

fn disasm(matches: &ArgMatches) -> Result<(), CliError> {
    let profile = profile(matches)?;
    let raw = raw_code(matches)?;
    let arena = CodeArena::new();
    let unit = code::decode(&raw, &profile, &arena)?;
    print!("{}", unit.listing());
    Ok(())
}

fn roundtrip(matches: &ArgMatches) -> Result<(), CliError> {
    let profile = profile(matches)?;
    let raw = raw_code(matches)?;
    let arena = CodeArena::new();
    let mut unit = code::decode(&raw, &profile, &arena)?;
    let (encoded, stats) = unit.encode()?;
    log::info!(
        "Encoded {} bytes in {} iterations",
        encoded.code.len(),
        stats.iterations
    );

    if encoded.code != raw.code {
        return Err(CliError::Mismatch {
            expected: to_hex(&raw.code),
            found: to_hex(&encoded.code),
        });
    }
    if matches.contains_id("lnotab") && encoded.line_table != raw.line_table {
        return Err(CliError::Mismatch {
            expected: to_hex(&raw.line_table),
            found: to_hex(&encoded.line_table),
        });
    }
    println!("{}", to_hex(&encoded.code));
    println!("identical ({} bytes)", encoded.code.len());
    Ok(())
}

fn optimise(matches: &ArgMatches) -> Result<(), CliError> {
    let profile = profile(matches)?;
    let raw = raw_code(matches)?;
    let arena = CodeArena::new();
    let mut unit = code::decode(&raw, &profile, &arena)?;
    unit.optimise();
    let (encoded, stats) = unit.encode()?;
    log::info!(
        "Optimised {} bytes down to {} bytes ({} prefixes added)",
        raw.code.len(),
        encoded.code.len(),
        stats.inserted_prefixes
    );

    println!("{}", to_hex(&encoded.code));
    if !encoded.line_table.is_empty() {
        println!("lnotab: {}", to_hex(&encoded.line_table));
    }
    print!("{}", unit.listing());
    Ok(())
}

fn trace(matches: &ArgMatches) -> Result<(), CliError> {
    let profile = profile(matches)?;
    let raw = raw_code(matches)?;
    let arena = CodeArena::new();
    let mut unit = code::decode(&raw, &profile, &arena)?;

    let offset = matches.get_one::<usize>("offset").copied().unwrap_or(0);
    let depth = matches.get_one::<u32>("depth").copied().unwrap_or(0);
    let node = unit
        .predecessors()
        .reachable()
        .iter()
        .copied()
        .find(|node| node.offset() == Some(offset) && !node.is_prefix(&profile))
        .ok_or_else(|| CliError::Usage(format!("no instruction at offset {}", offset)))?;

    let found: Vec<_> = if matches.get_flag("consumers") {
        unit.trace_consumer(node, depth).collect()
    } else {
        unit.trace_producer(node, depth).collect()
    };
    if found.is_empty() {
        println!("unknown");
    }
    for node in found {
        let offset = node
            .offset()
            .map_or_else(|| String::from("-"), |offset| offset.to_string());
        println!("{:>6} {}", offset, profile.opcode_name(node.opcode()));
    }
    Ok(())
}

/// Parse a constant written the way the interpreter would print it
fn parse_constant(text: &str) -> Result<Constant, CliError> {
    let text = text.trim();
    let quoted = |inner: &str| -> Option<String> {
        let bytes = inner.as_bytes();
        if bytes.len() >= 2
            && (bytes[0] == b'\'' || bytes[0] == b'"')
            && bytes[bytes.len() - 1] == bytes[0]
        {
            Some(inner[1..inner.len() - 1].to_owned())
        } else {
            None
        }
    };

    let constant = match text {
        "None" => Constant::None,
        "Ellipsis" | "..." => Constant::Ellipsis,
        "True" => Constant::Bool(true),
        "False" => Constant::Bool(false),
        _ => {
            if let Ok(int) = text.parse::<i64>() {
                Constant::Int(int)
            } else if let Ok(float) = text.parse::<f64>() {
                Constant::Float(float)
            } else if let Some(string) = quoted(text) {
                Constant::Str(string)
            } else if let Some(bytes) = text.strip_prefix('b').and_then(quoted) {
                Constant::Bytes(bytes.into_bytes())
            } else if text.is_empty() {
                return Err(CliError::Usage(String::from("empty constant")));
            } else {
                Constant::Str(text.to_owned())
            }
        }
    };
    Ok(constant)
}

fn parse_hex(text: &str) -> Result<Vec<u8>, CliError> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|c| !c.is_ascii_whitespace() && *c != b'_')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::Usage(format!("odd number of hex digits in '{}'", text)));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).unwrap_or("");
            u8::from_str_radix(pair, 16)
                .map_err(|_| CliError::Usage(format!("invalid hex '{}'", text)))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}
