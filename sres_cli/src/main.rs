use sres_cli::CliArgs;
use sres_machine::common::logging;
use tracing_chrome::ChromeLayerBuilder;
use tracing_subscriber::prelude::*;

fn main() -> anyhow::Result<()> {
    logging::init();
    let args: CliArgs = argh::from_env();
    let _tracing_guard = if let Some(trace_file) = &args.trace_file {
        let (chrome_layer, guard) = ChromeLayerBuilder::new().file(trace_file).build();
        tracing_subscriber::registry().with(chrome_layer).init();
        Some(guard)
    } else {
        None
    };
    let report = sres_cli::run(&args)?;
    for line in &report.scheduler_log {
        println!("{}", line);
    }
    println!(
        "Ran {} frames, {} audio samples",
        report.frames, report.audio_samples
    );
    Ok(())
}
