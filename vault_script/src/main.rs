//! CLI entry point for vault_script.
//! Usage: cargo run -p vault_script -- lint levels/entry.des

use std::{env, fs, process};

use vault_data::{MapSection, parse_depth_ranges};
use vault_script::{DesFileAst, canonical_directive, parse_des};

fn main() {
    let args: Vec<String> = env::args().collect();

    // Accept either:
    // 1) cargo run: <bin> -- <cmd> <args>
    // 2) direct:    <bin> <cmd> <args>
    let rest: Vec<String> = match args.as_slice() {
        [_, flag, cmd, tail @ ..] if flag == "--" && (cmd == "dump" || cmd == "lint") => {
            let mut v = vec![cmd.clone()];
            v.extend_from_slice(tail);
            v
        },
        [_, cmd, tail @ ..] if cmd == "dump" || cmd == "lint" => {
            let mut v = vec![cmd.clone()];
            v.extend_from_slice(tail);
            v
        },
        _ => {
            eprintln!("Usage:\n  vault_script dump <file.des> [--out <out.ron>]\n  vault_script lint <file.des>...");
            process::exit(2);
        },
    };
    if rest[0] == "dump" {
        run_dump(&rest[1..]);
    } else {
        run_lint(&rest[1..]);
    }
}

fn read_and_parse(path: &str) -> DesFileAst {
    let src = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: unable to read '{path}': {e}");
        process::exit(1);
    });
    parse_des(&src).unwrap_or_else(|e| {
        eprintln!("{path}: {e}");
        process::exit(1);
    })
}

fn run_dump(args: &[String]) {
    let mut path: Option<String> = None;
    let mut out_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--out" {
            if i + 1 >= args.len() {
                eprintln!("--out requires a filepath");
                process::exit(2);
            }
            out_path = Some(args[i + 1].clone());
            i += 2;
            continue;
        }
        if path.is_none() {
            path = Some(args[i].clone());
        }
        i += 1;
    }
    let Some(path) = path else {
        eprintln!("Usage: vault_script dump <file.des> [--out <out.ron>]");
        process::exit(2);
    };
    let ast = read_and_parse(&path);
    let text = ron::ser::to_string_pretty(&ast, ron::ser::PrettyConfig::default()).unwrap_or_else(|e| {
        eprintln!("error: serializing '{path}': {e}");
        process::exit(1);
    });
    if let Some(out) = out_path {
        fs::write(&out, text).unwrap_or_else(|e| {
            eprintln!("error: writing '{out}': {e}");
            process::exit(1);
        });
    } else {
        println!("{text}");
    }
}

fn run_lint(args: &[String]) {
    if args.is_empty() {
        eprintln!("Usage: vault_script lint <file.des>...");
        process::exit(2);
    }
    let mut problems = 0usize;
    for path in args {
        let ast = read_and_parse(path);
        for warning in lint_file(&ast) {
            eprintln!("{path}:{warning}");
            problems += 1;
        }
    }
    if problems > 0 {
        eprintln!("{problems} problem(s) found");
        process::exit(1);
    }
    println!("ok");
}

/// Shape checks that need no catalog: directive names, depth ranges, orientations.
fn lint_file(ast: &DesFileAst) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for map in &ast.maps {
        if !seen.insert(map.name.as_str()) {
            out.push(format!("{}: duplicate map name '{}'", map.line, map.name));
        }
        if let Some(depth) = &map.default_depth
            && let Err(e) = parse_depth_ranges(depth)
        {
            out.push(format!("{}: default-depth for '{}': {e}", map.line, map.name));
        }
        for d in map.directives() {
            match canonical_directive(&d.key) {
                None => out.push(format!("{}: unknown directive '{}'", d.line, d.key)),
                Some("DEPTH") => {
                    if let Err(e) = parse_depth_ranges(&d.value) {
                        out.push(format!("{}: {e}", d.line));
                    }
                },
                Some("ORIENT") => {
                    if MapSection::from_name(&d.value).is_none() {
                        out.push(format!("{}: Bad orient: {}", d.line, d.value));
                    }
                },
                Some(_) => {},
            }
        }
        if map.rows().next().is_none() {
            out.push(format!("{}: map '{}' has no MAP block", map.line, map.name));
        }
    }
    out
}
