use std::path::PathBuf;
use std::str::FromStr;

use gantry_core::GantryConfig;
use gantry_docker::{BuildPipeline, DockerClient, PipelineOptions, PipelineOutcome, StopPoint};

/// Run the full image build pipeline for every dependency group.
pub async fn build(
    env_name: &str,
    until: Option<&str>,
    skip_tests: bool,
    ignore_git: bool,
    entry_point: &str,
    json: bool,
) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");

    let until = until
        .map(StopPoint::from_str)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    let config = GantryConfig::load(&project_dir)?;

    // Local state lives under ~/.gantry; resolved here and injected so the
    // packaging layer never reads ambient process state.
    let home_dir = dirs::home_dir().map(|home| home.join(".gantry"));

    let opts = PipelineOptions {
        env_name: env_name.to_owned(),
        entry_point: entry_point.to_owned(),
        until,
        skip_tests,
        ignore_git,
        home_dir,
    };

    let pipeline = BuildPipeline::new(DockerClient::new(), opts);
    match pipeline.run(&project_dir, &config).await? {
        PipelineOutcome::Completed { name, images } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&images)?);
            } else {
                println!("Images generated for {name}:");
                for (pattern, image) in &images {
                    println!("  {pattern} -> {image}");
                }
            }
        }
        PipelineOutcome::Halted { message, .. } => {
            println!("{message}");
        }
    }

    Ok(())
}
