use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use r5900_decompiler::FunctionLifter;
use r5900_ir::{FunctionRef, FunctionTable, TextSink, TypeRegistry};

use crate::{
    config::{parse_u64_with_prefix, DisConfig},
    library::TypeLibrary,
    loader::{FunctionRange, Program},
};

mod config;
mod library;
mod loader;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("R5900_LOG"))
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(input) = args.next()
    else {
        anyhow::bail!("usage: r5900-dis <input> [function name or address]...");
    };
    let selected: Vec<String> = args.collect();

    let config = DisConfig::from_env()?;
    let data = std::fs::read(&input).with_context(|| format!("error reading {input}"))?;
    let program = Program::load(data, config.base_addr, config.endianness()?)?;

    let types = TypeRegistry::new();
    let library = match &config.types_path {
        Some(path) => TypeLibrary::load(path)?,
        None => TypeLibrary::default(),
    };
    library.define_types(&types)?;

    let mut functions = FunctionTable::new();
    for range in &program.functions {
        functions.insert(FunctionRef::new(&range.name, range.start));
    }
    for function in library.function_table(&types)?.functions() {
        functions.insert(function.clone());
    }

    let ranges = select_ranges(&program, &library, &selected)?;
    if ranges.is_empty() {
        anyhow::bail!("no functions to decompile");
    }

    let output = decompile_all(&config, &program, &library, &types, &functions, &ranges)?;
    for text in output {
        print!("{text}");
    }
    Ok(())
}

/// Finds the functions to decompile: symbols first, then library entries with a known end, then
/// the whole input.
fn select_ranges(
    program: &Program,
    library: &TypeLibrary,
    selected: &[String],
) -> anyhow::Result<Vec<FunctionRange>> {
    let mut ranges = program.functions.clone();
    for def in &library.functions {
        let Some(end) = def.end
        else {
            continue;
        };
        if !ranges.iter().any(|range| range.start == def.address) {
            ranges.push(FunctionRange { name: def.name.clone(), start: def.address, end });
        }
    }
    if ranges.is_empty() {
        ranges.extend(program.default_range());
    }
    ranges.sort_by_key(|range| range.start);

    if selected.is_empty() {
        return Ok(ranges);
    }

    let mut out = vec![];
    for name in selected {
        let address = parse_u64_with_prefix(name);
        let range = ranges
            .iter()
            .find(|range| range.name == *name || Some(range.start) == address)
            .with_context(|| format!("unknown function: {name}"))?;
        out.push(range.clone());
    }
    Ok(out)
}

/// Decompiles `ranges` on a pool of scoped workers, returning the text of each in order.
fn decompile_all(
    config: &DisConfig,
    program: &Program,
    library: &TypeLibrary,
    types: &TypeRegistry,
    functions: &FunctionTable,
    ranges: &[FunctionRange],
) -> anyhow::Result<Vec<String>> {
    let next = AtomicUsize::new(0);
    let threads = config.threads.min(ranges.len());
    tracing::info!("decompiling {} functions on {threads} threads", ranges.len());

    let mut output: Vec<(usize, String)> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| -> anyhow::Result<Vec<(usize, String)>> {
                    let lifter = FunctionLifter::new(types)
                        .with_config(config.decompiler.clone())
                        .with_functions(functions);
                    let mut reader = program.reader();
                    let mut done = vec![];
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(range) = ranges.get(index)
                        else {
                            break;
                        };
                        let params = library.params(types, range.start)?;
                        let text = match lifter.lift(&mut reader, range.start, range.end, &params) {
                            Ok(function) => {
                                let mut sink = TextSink::new(types).with_functions(functions);
                                function.render(&mut sink);
                                sink.finish()
                            }
                            Err(e) => {
                                tracing::error!("failed to decompile {}: {e}", range.name);
                                format!("/* {}: {e} */\n", range.name)
                            }
                        };
                        done.push((index, text + "\n"));
                    }
                    Ok(done)
                })
            })
            .collect();

        let mut output = vec![];
        for worker in workers {
            let done = worker.join().map_err(|_| anyhow::format_err!("worker panicked"))??;
            output.extend(done);
        }
        anyhow::Ok(output)
    })?;

    output.sort_by_key(|(index, _)| *index);
    Ok(output.into_iter().map(|(_, text)| text).collect())
}
