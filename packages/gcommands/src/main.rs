//! gcommands CLI binary
//! Speech Commands keyword-spotting trainer using Candle ML

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

mod cli;
use cli::{Cli, Commands};

use gcommands::{
    Checkpoint, CheckpointLoad, dataset::prepare_splits, fit, select_device, test_checkpoint,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(cmd) => train(cmd),
        Commands::Test(cmd) => test(cmd),
        Commands::Prepare(cmd) => prepare(cmd),
        Commands::Inspect(cmd) => inspect(cmd),
    }
}

fn train(cmd: cli::TrainCommand) -> Result<()> {
    let cfg = cmd.resolve().context("invalid training configuration")?;
    if cmd.print_config {
        print!("{}", cfg.to_toml_string()?);
        return Ok(());
    }
    info!("Training with config: {cfg:?}");

    let report = fit(&cfg).context("training failed")?;

    println!(
        "Trained {} epoch(s){}",
        report.epochs_run,
        if report.stopped_early { " (stopped early)" } else { "" }
    );
    match report.best_epoch {
        Some(epoch) => println!(
            "Best model: epoch {epoch}, valid loss {:.4}, saved to {}",
            report.best_valid_loss,
            report.checkpoint.display()
        ),
        None => println!("No checkpoint written"),
    }
    println!(
        "Test: loss {:.4}, accuracy {}/{} ({:.2}%)",
        report.test.loss,
        report.test.correct,
        report.test.total,
        report.test.accuracy()
    );
    Ok(())
}

fn test(cmd: cli::TestCommand) -> Result<()> {
    let device = select_device(cmd.cuda)?;
    let eval = test_checkpoint(&cmd.checkpoint, &cmd.test_path, cmd.test_batch_size, &device)
        .with_context(|| format!("testing {}", cmd.checkpoint.display()))?;
    println!(
        "{}: loss {:.4}, accuracy {}/{} ({:.2}%)",
        cmd.test_path.display(),
        eval.loss,
        eval.correct,
        eval.total,
        eval.accuracy()
    );
    Ok(())
}

fn prepare(cmd: cli::PrepareCommand) -> Result<()> {
    info!("Splitting {} into {} ({})", cmd.raw.display(), cmd.out.display(), cmd.mode);
    let counts = prepare_splits(&cmd.raw, &cmd.out, cmd.mode)
        .with_context(|| format!("preparing splits from {}", cmd.raw.display()))?;
    println!(
        "train {}, valid {}, test {} ({} clips)",
        counts.train,
        counts.valid,
        counts.test,
        counts.total()
    );
    Ok(())
}

fn inspect(cmd: cli::InspectCommand) -> Result<()> {
    let ckpt = Checkpoint::load_from_file(&cmd.checkpoint)
        .with_context(|| format!("loading {}", cmd.checkpoint.display()))?;

    println!("Checkpoint Information:");
    println!("  Version: {}", ckpt.version());
    println!("  Architecture: {}", ckpt.arch);
    println!("  Epoch: {}", ckpt.epoch);
    println!("  Valid loss: {:.4}", ckpt.valid_loss);
    println!("  Input: {}x{}", ckpt.input_dims.0, ckpt.input_dims.1);
    println!(
        "  Features: {} window {}s, stride {}s, max_len {}, normalize {}",
        ckpt.spectrogram.window,
        ckpt.spectrogram.window_size,
        ckpt.spectrogram.window_stride,
        ckpt.spectrogram.max_len,
        ckpt.spectrogram.normalize
    );
    println!("  Labels ({}): {:?}", ckpt.labels.len(), ckpt.labels);
    println!("  Parameters: {}", ckpt.num_params());
    println!("  Weights:");
    for (name, td) in &ckpt.weights {
        println!(
            "    {}: dims {:?}, dtype {}, {} bytes",
            name,
            td.dims,
            td.d_type,
            td.bytes.len()
        );
    }
    Ok(())
}
