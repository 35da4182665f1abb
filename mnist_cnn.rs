// mnist_cnn.rs
// Train the reference digit CNN end to end on CPU.
//
// Usage:
//   mnist_cnn [config.json] [--log <history.csv>]
//
// Without a config file the default hyperparameters are used. The images are
// generated seven-segment digits (see `data::synthetic_digits`), so the binary
// runs without any dataset on disk.
//
// Output:
//   - network summary and per-epoch metrics (RUST_LOG=info for the log lines)
//   - per-epoch history CSV if --log is given
//   - prints test loss and accuracy

use log::info;
use mnist_convnet::config::{load_config, ModelConfig};
use mnist_convnet::data::synthetic_digits;
use mnist_convnet::trainer::Trainer;
use mnist_convnet::utils::SimpleRng;
use mnist_convnet::{Error, Result};
use std::env;
use std::process;

const TRAIN_SAMPLES: usize = 6_000;
const VALIDATION_SAMPLES: usize = 1_000;
const TEST_SAMPLES: usize = 1_000;

struct Args {
    config: Option<String>,
    log: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        log: None,
    };
    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--log" => {
                let path = iter
                    .next()
                    .ok_or_else(|| Error::config("--log needs a file path"))?;
                args.log = Some(path);
            }
            flag if flag.starts_with("--") => {
                return Err(Error::config(format!("unknown option {}", flag)));
            }
            _ if args.config.is_none() => args.config = Some(arg),
            _ => return Err(Error::config(format!("unexpected argument {}", arg))),
        }
    }
    Ok(args)
}

fn run() -> Result<()> {
    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => {
            info!("loading config from {}", path);
            load_config(path)?
        }
        None => ModelConfig::default(),
    };

    let mut rng = SimpleRng::new(config.seed);
    let mut data_rng = rng.fork();
    let mut init_rng = rng.fork();

    println!("Generating synthetic digits...");
    let (train, validation) = synthetic_digits(TRAIN_SAMPLES + VALIDATION_SAMPLES, &mut data_rng)
        .split(VALIDATION_SAMPLES)?;
    let test = synthetic_digits(TEST_SAMPLES, &mut data_rng);
    println!(
        "Train: {} | Validation: {} | Test: {}",
        train.len(),
        validation.len(),
        test.len()
    );

    let network = config.build_network(&mut init_rng)?;
    print!("{}", network.summary());

    let mut trainer = Trainer::new(network, config.optimizer()?, config.trainer_config())?;
    println!(
        "Training CNN: epochs={} batch={} rho={} eps={}",
        config.epochs, config.batch_size, config.optimizer_decay, config.optimizer_epsilon
    );
    let report = trainer.fit_with(&train, Some(&validation), |m| {
        println!(
            "Epoch {} | loss={:.6} | acc={:.4} | time={:.3}s",
            m.epoch, m.train_loss, m.train_accuracy, m.seconds
        );
        std::ops::ControlFlow::Continue(())
    })?;

    if let Some(path) = &args.log {
        report.write_history_csv(path)?;
        println!("History written to {}", path);
    }

    println!("Testing...");
    let test_metrics = trainer.evaluate(&test)?;
    println!("Test loss: {:.6}", test_metrics.loss);
    println!("Test Accuracy: {:.2}%", 100.0 * test_metrics.accuracy);
    info!(
        "finished after {} epochs ({:?}), test accuracy {:.4}",
        report.history.len(),
        report.stop_reason,
        test_metrics.accuracy
    );
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        if let Error::NumericInstability {
            last_finite: Some(last),
            ..
        } = &e
        {
            eprintln!(
                "last finite epoch {}: loss={:.6} acc={:.4}",
                last.epoch, last.train_loss, last.train_accuracy
            );
        }
        process::exit(1);
    }
}
