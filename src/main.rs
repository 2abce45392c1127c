//! Strata CLI - headless layered hydraulic erosion.
//!
//! Loads (or defaults) a simulation configuration, builds terrain from a RAW
//! heightmap or a synthetic dome, runs the erosion engine and exports the
//! resulting surface and water maps.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;

use strata::erosion::{ErosionBackend, SimulationConfig};
use strata::export::{export_snapshot_raw, import_heightmap_r32, RawFormat};
use strata::simulation::ErosionEngine;
use strata::terrain::{dome_heightmap, GridLayout};

/// Layered grid-based hydraulic erosion.
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the erosion engine and export the result.
    Simulate {
        /// JSON configuration file (defaults are used when omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// R32 little-endian heightmap of side_length² values.
        #[arg(long)]
        heightmap: Option<PathBuf>,

        /// Peak height of the synthetic dome used when no heightmap is given.
        #[arg(long, default_value = "1.5")]
        dome_peak: f32,

        /// Fraction of the initial height split among the sediment rock types.
        #[arg(long, default_value = "0.3")]
        cover: f32,

        /// Number of erosion iterations.
        #[arg(short, long, default_value = "200")]
        iterations: u32,

        /// Iterations per progress report.
        #[arg(long, default_value = "50")]
        batch: u32,

        /// Override the configured backend.
        #[arg(short, long)]
        backend: Option<BackendArg>,

        /// Override the configured seed.
        #[arg(short, long)]
        seed: Option<u64>,

        /// Output directory for exported maps.
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Base name for output files.
        #[arg(short, long, default_value = "strata")]
        name: String,

        /// Export format.
        #[arg(short, long, default_value = "raw-float")]
        format: ExportFormat,
    },

    /// Print the default configuration as JSON.
    DefaultConfig {
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Display allocation sizes for a configuration.
    Info {
        /// JSON configuration file (defaults are used when omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Auto,
    Gpu,
    Cpu,
}

impl From<BackendArg> for ErosionBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => ErosionBackend::Auto,
            BackendArg::Gpu => ErosionBackend::GpuOnly,
            BackendArg::Cpu => ErosionBackend::CpuOnly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    /// 16-bit RAW little-endian (Unity).
    Raw,
    /// 16-bit RAW big-endian.
    RawBe,
    /// 32-bit float RAW (high precision).
    RawFloat,
}

impl From<ExportFormat> for RawFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Raw => RawFormat::R16LittleEndian,
            ExportFormat::RawBe => RawFormat::R16BigEndian,
            ExportFormat::RawFloat => RawFormat::R32Float,
        }
    }
}

struct SimulateArgs {
    config: Option<PathBuf>,
    heightmap: Option<PathBuf>,
    dome_peak: f32,
    cover: f32,
    iterations: u32,
    batch: u32,
    backend: Option<BackendArg>,
    seed: Option<u64>,
    output: PathBuf,
    name: String,
    format: ExportFormat,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            heightmap,
            dome_peak,
            cover,
            iterations,
            batch,
            backend,
            seed,
            output,
            name,
            format,
        } => run_simulate(SimulateArgs {
            config,
            heightmap,
            dome_peak,
            cover,
            iterations,
            batch,
            backend,
            seed,
            output,
            name,
            format,
        }),
        Commands::DefaultConfig { output } => run_default_config(output),
        Commands::Info { config } => run_info(config),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn load_config(path: Option<&Path>) -> SimulationConfig {
    match path {
        Some(path) => SimulationConfig::load(path).unwrap_or_else(|e| fail(format!("{}: {e}", path.display()))),
        None => SimulationConfig::default(),
    }
}

fn run_simulate(args: SimulateArgs) {
    let mut config = load_config(args.config.as_deref());
    if let Some(backend) = args.backend {
        config.erosion.backend = backend.into();
    }
    if let Some(seed) = args.seed {
        config.erosion.seed = seed;
    }
    let side = config.grid.side_length;

    println!("Strata - Layered Hydraulic Erosion");
    println!("==================================");
    println!("Grid: {side}x{side}, {} layers, {} rock types", config.grid.layer_count, config.grid.rock_types.len());
    println!("Seed: {}", config.erosion.seed);
    println!("Output: {}", args.output.display());
    println!();

    let heights = match &args.heightmap {
        Some(path) => {
            println!("Importing heightmap {}...", path.display());
            import_heightmap_r32(path, side).unwrap_or_else(|e| fail(e))
        }
        None => {
            println!("Synthesising dome heightmap (peak {})...", args.dome_peak);
            dome_heightmap(side, args.dome_peak, config.erosion.seed)
        }
    };

    let mut engine = ErosionEngine::new(config).unwrap_or_else(|e| fail(e));
    engine
        .initialize_from_heights(&heights, args.cover)
        .unwrap_or_else(|e| fail(e));
    println!("Backend: {}", engine.backend_name().unwrap_or("none"));

    let start = Instant::now();
    let batch = args.batch.max(1);
    let mut done = 0;
    while done < args.iterations {
        let n = batch.min(args.iterations - done);
        engine.run(n).unwrap_or_else(|e| fail(e));
        done += n;
        println!("  [{done}/{}] iterations", args.iterations);
    }
    println!("Erosion finished in {:.2?}", start.elapsed());

    let snapshot = engine.snapshot().unwrap_or_else(|e| fail(e));
    let water: f32 = snapshot.water_depths().iter().sum();
    let volume = snapshot.to_volume().total_volume();
    println!("Total rock volume: {volume:.4}");
    println!("Total water: {water:.4}");

    let paths =
        export_snapshot_raw(&snapshot, &args.output, &args.name, args.format.into()).unwrap_or_else(|e| fail(e));
    for path in paths {
        println!("Wrote {}", path.display());
    }
    engine.dispose();
}

fn run_default_config(output: Option<PathBuf>) {
    let json = SimulationConfig::default()
        .to_json_pretty()
        .unwrap_or_else(|e| fail(e));
    match output {
        Some(path) => {
            std::fs::write(&path, json).unwrap_or_else(|e| fail(e));
            println!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
}

fn run_info(config: Option<PathBuf>) {
    let config = load_config(config.as_deref());
    if let Err(e) = config.validate() {
        fail(e);
    }
    let layout = GridLayout::from_config(&config.grid);
    let mb = |bytes: u64| bytes as f64 / 1024.0 / 1024.0;

    let bytes_terrain = layout.terrain_len() as u64 * 4;
    let bytes_cells = layout.cell_len() as u64 * 48;
    let bytes_r16 = layout.plane_size() as u64 * 2;
    let bytes_r32 = layout.plane_size() as u64 * 4;

    println!("Strata - Configuration Info");
    println!("===========================");
    println!();
    println!("Grid: {0}x{0}", layout.side_length());
    println!("Layers: {}", layout.layer_count());
    println!("Rock types: {}", layout.rock_type_count());
    println!("Layer cap: {:.3}", config.grid.layer_cap());
    println!("Backend: {:?}", config.erosion.backend);
    println!();
    println!("Memory usage (in-memory):");
    println!("  Terrain: {:>12} floats ({:.2} MB)", layout.terrain_len(), mb(bytes_terrain));
    println!("  Cells:   {:>12} cells  ({:.2} MB)", layout.cell_len(), mb(bytes_cells));
    println!();
    println!("Export file sizes (per map):");
    println!("  RAW (R16): {:>10} bytes ({:.2} MB)", bytes_r16, mb(bytes_r16));
    println!("  RAW (R32): {:>10} bytes ({:.2} MB)", bytes_r32, mb(bytes_r32));
}
