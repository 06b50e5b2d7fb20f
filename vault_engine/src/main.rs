#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
//! ** vault **
//! Check, render, cache and pick maps from level description files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;

use vault_data::{Branch, LevelId};
use vault_engine::config::CONFIG_FILE;
use vault_engine::{Catalog, EngineConfig, MapDef, MapRegistry, ScriptHost, VAULT_VERSION, load_config, load_des_file};

/// Maps tried before `pick` gives up on a level.
const MAX_PICK_ATTEMPTS: usize = 10;

#[derive(Parser)]
#[command(author, version, about = "Map-definition tools for vault level files.")]
struct Cli {
    /// Engine settings file.
    #[arg(long, value_name = "FILE", default_value = CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and validate every map in the given level files.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Resolve one map and print its grid.
    Render(RenderArgs),
    /// Write index and data cache files for the given level files.
    Cache {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output directory (defaults to the configured cache directory).
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Choose a map for a level the way level generation would.
    Pick {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Level such as `D:5` or `Lair:2`.
        #[arg(long)]
        level: String,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Args)]
struct RenderArgs {
    file: PathBuf,
    /// Name of the map to render.
    #[arg(long)]
    map: String,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, value_enum)]
    rotate: Option<Turn>,
    #[arg(long)]
    hmirror: bool,
    #[arg(long)]
    vmirror: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Turn {
    Cw,
    Ccw,
}

struct Session {
    config: EngineConfig,
    catalog: Catalog,
    host: ScriptHost,
}

impl Session {
    fn start(config_path: &Path) -> Result<Self> {
        let config = load_config(config_path);
        let catalog = config.load_catalog().context("loading catalog")?;
        let host = ScriptHost::new(&config, catalog.clone()).context("starting script host")?;
        Ok(Self { config, catalog, host })
    }

    /// Build every file into one registry; returns it with the number of problems seen.
    fn registry(&self, files: &[PathBuf], rng: &mut StdRng) -> Result<(MapRegistry, usize)> {
        let mut registry = MapRegistry::new();
        let mut problems = 0;
        for file in files {
            let (maps, errors) = load_des_file(file, &self.catalog, rng)?;
            for e in &errors {
                println!("{} {e}", "error:".bright_red().bold());
            }
            problems += errors.len();
            for map in maps {
                if let Err(e) = registry.add(map) {
                    println!("{} {}: {e}", "error:".bright_red().bold(), file.display());
                    problems += 1;
                }
            }
        }
        Ok((registry, problems))
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!("vault {VAULT_VERSION}");
    let session = Session::start(&cli.config)?;
    match cli.command {
        Commands::Check { files } => run_check(&session, &files),
        Commands::Render(args) => run_render(&session, &args),
        Commands::Cache { files, out } => run_cache(&session, &files, out),
        Commands::Pick { files, level, seed } => run_pick(&session, &files, &level, seed),
    }
}

fn run_check(session: &Session, files: &[PathBuf]) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0);
    let (registry, mut problems) = session.registry(files, &mut rng)?;
    for map in registry.iter() {
        let mut copy = map.clone();
        match copy.validate_map_def(&session.host, &mut rng) {
            Ok(()) => println!("{} {}", "ok".bright_green(), map.name),
            Err(e) => {
                println!("{} {}: {e}", "FAIL".bright_red().bold(), map.name.bold());
                problems += 1;
            },
        }
    }
    if problems > 0 {
        bail!("{problems} problem(s) in {} map(s)", registry.len());
    }
    println!("{} maps checked", registry.len());
    Ok(())
}

fn run_render(session: &Session, args: &RenderArgs) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let (registry, _) = session.registry(std::slice::from_ref(&args.file), &mut rng)?;
    let template = registry
        .find_by_name(&args.map)
        .with_context(|| format!("no map named '{}' in '{}'", args.map, args.file.display()))?;
    let mut map = registry.instantiate(template.id())?;

    map.run_lua(&session.host, &mut rng, true)?;
    map.fixup();
    match args.rotate {
        Some(Turn::Cw) => {
            map.rotate(true);
        },
        Some(Turn::Ccw) => {
            map.rotate(false);
        },
        None => {},
    }
    if args.hmirror {
        map.hmirror();
    }
    if args.vmirror {
        map.vmirror();
    }
    map.resolve(&mut rng);
    let valid = map.test_lua_validate(&session.host, &mut rng)?;

    print_map(&map);
    if !valid {
        println!("{}", "validate chunk rejected this map".yellow());
    }
    Ok(())
}

fn print_map(map: &MapDef) {
    println!("{} ({}, orient {})", map.name.bold().bright_blue(), map.tags.describe(), map.orient);
    for line in map.map.get_lines() {
        println!("{line}");
    }
    if let Some(pos) = map.float_pos() {
        println!("placed at ({}, {})", pos.x, pos.y);
    }
}

fn run_cache(session: &Session, files: &[PathBuf], out: Option<PathBuf>) -> Result<()> {
    let dir = out.unwrap_or_else(|| session.config.cache_dir.clone());
    let mut rng = StdRng::seed_from_u64(0);
    for file in files {
        let (mut registry, problems) = session.registry(std::slice::from_ref(file), &mut rng)?;
        if problems > 0 {
            bail!("'{}' has {problems} problem(s); not caching it", file.display());
        }
        let stem = file
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("no usable file name in '{}'", file.display()))?;
        registry.write_cache(&dir, stem)?;
        println!("{} {} -> {}", "cached".bright_green(), file.display(), dir.join(stem).display());
    }
    Ok(())
}

fn parse_level(s: &str) -> Result<LevelId> {
    let (branch, depth) = s.split_once(':').unwrap_or(("D", s));
    let branch = Branch::from_abbrev(branch.trim()).with_context(|| format!("unknown branch in '{s}'"))?;
    let depth = depth.trim().parse().with_context(|| format!("bad depth in '{s}'"))?;
    Ok(LevelId::new(branch, depth))
}

fn run_pick(session: &Session, files: &[PathBuf], level: &str, seed: u64) -> Result<()> {
    let level = parse_level(level)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let (registry, _) = session.registry(files, &mut rng)?;

    for _ in 0..MAX_PICK_ATTEMPTS {
        let Some(id) = registry.random_map_for_level(&level, &mut rng) else {
            bail!("no map can be used on {level}");
        };
        let mut map = registry.instantiate(id)?;
        map.run_lua(&session.host, &mut rng, true)?;
        map.fixup();
        map.resolve(&mut rng);
        if !map.test_lua_validate(&session.host, &mut rng)? {
            info!("{} failed validation on {level}; picking again", map.name);
            continue;
        }
        if !map.test_lua_veto(&session.host, &mut rng)? {
            info!("{} vetoed on {level}; picking again", map.name);
            continue;
        }
        print_map(&map);
        return Ok(());
    }
    bail!("no usable map found for {level} after {MAX_PICK_ATTEMPTS} attempts")
}
