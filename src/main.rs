use std::{env, fs};

use anyhow::{bail, Context, Result};
use log::info;

use lrp::specs::{ExplanationSpec, JobSpec, SpecBuilder};

fn main() -> Result<()> {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        bail!("usage: lrp <job.json>");
    };

    let raw = fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
    let spec: JobSpec = serde_json::from_str(&raw).with_context(|| format!("failed to parse {path}"))?;

    let job = SpecBuilder::new().build(&spec).context("failed to build the analyzer")?;
    let explanation = job.run().context("analysis failed")?;
    info!("explained neuron(s) {:?}", explanation.selected);

    let out = serde_json::to_string_pretty(&ExplanationSpec::from(&explanation))?;
    println!("{out}");

    Ok(())
}
