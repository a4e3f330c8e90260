use iml_mapper::config::{load_config, MapperConfig};
use iml_mapper::{Iml, Mode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// An XY pad driving four synthesis parameters.
const NUM_INPUTS: usize = 2;
const NUM_OUTPUTS: usize = 4;
// Grid resolution for the sweep after training.
const SWEEP_STEPS: usize = 5;
const MODEL_FILE: &str = "simple_mapping.bin";

// One demonstrated pad position and the parameters it should produce.
const CORNERS: [([f32; NUM_INPUTS], [f32; NUM_OUTPUTS]); 4] = [
    ([0.0, 0.0], [0.1, 0.1, 0.9, 0.5]),
    ([1.0, 0.0], [0.9, 0.1, 0.1, 0.5]),
    ([0.0, 1.0], [0.1, 0.9, 0.1, 0.2]),
    ([1.0, 1.0], [0.9, 0.9, 0.9, 0.8]),
];

// Mapper config from the first CLI argument, defaults otherwise.
fn config_from_args(args: &[String]) -> MapperConfig {
    let mut config = match args.get(1) {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(err) => {
                error!(%err, path = %path, "could not load config, using defaults");
                MapperConfig::default()
            }
        },
        None => MapperConfig::default(),
    };
    if config.seed.is_none() {
        config.seed = Some(7);
    }
    config
}

// Demonstrate every corner with the two-phase capture gesture.
fn record_corners(iml: &mut Iml) {
    iml.set_mode(Mode::Training);
    for (input, output) in CORNERS.iter() {
        iml.set_inputs(input);
        iml.save_example();
        iml.set_outputs(output);
        iml.save_example();
    }
}

// Outputs over an evenly spaced grid of pad positions.
fn sweep(iml: &mut Iml, steps: usize) -> Vec<(f32, f32, Vec<f32>)> {
    let denom = steps.saturating_sub(1).max(1) as f32;
    let mut rows = Vec::with_capacity(steps * steps);
    for yi in 0..steps {
        for xi in 0..steps {
            let (x, y) = (xi as f32 / denom, yi as f32 / denom);
            iml.set_inputs(&[x, y]);
            rows.push((x, y, iml.process().to_vec()));
        }
    }
    rows
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = config_from_args(&args);

    let mut iml = match Iml::with_config(NUM_INPUTS, NUM_OUTPUTS, config) {
        Ok(iml) => iml,
        Err(err) => {
            error!(%err, "could not build mapper");
            std::process::exit(1);
        }
    };

    record_corners(&mut iml);
    info!(examples = iml.dataset().len(), "recorded corners");
    iml.set_mode(Mode::Inference);

    for (x, y, outputs) in sweep(&mut iml, SWEEP_STEPS) {
        let formatted: Vec<String> = outputs.iter().map(|v| format!("{v:.3}")).collect();
        println!("({x:.2}, {y:.2}) -> [{}]", formatted.join(", "));
    }

    match iml.save_network(MODEL_FILE) {
        Ok(()) => info!(path = MODEL_FILE, "network saved"),
        Err(err) => error!(%err, "failed to save network"),
    }
}
