//! Stresstest binary driving [`Workload`]s of persistent volume claim
//! lifecycle operations against a Kubernetes cluster.

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use pvcbench_client::ClientBuilder;

use stresstest::config::Config;
use stresstest::scenario::Scenarios;
use stresstest::workload::Workload;

/// Stresstester for persistent volume claim provisioning
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Args = argh::from_env();

    let config_file = std::fs::File::open(args.config).context("failed to open config file")?;
    let config: Config =
        serde_yaml::from_reader(config_file).context("failed to parse config YAML")?;

    let mut builder = ClientBuilder::new(config.namespace);
    if let Some(url) = config.cluster_url {
        builder = builder.cluster_url(url);
    }
    let client = builder.build().await.context("failed to build client")?;

    let scenarios = Scenarios::new(client, config.waits.creation, config.waits.deletion);
    let workloads = config
        .workloads
        .into_iter()
        .map(|w| {
            let mut builder = Workload::builder(w.name)
                .concurrency(w.concurrency)
                .storage_class(w.storage_class)
                .claim_size_gib(w.size_gib)
                .action_weights(w.actions.creates, w.actions.deletes, w.actions.gets, w.actions.lists);
            if let Some(prefix) = w.name_prefix {
                builder = builder.name_prefix(prefix);
            }
            builder.build()
        })
        .collect::<Result<_, _>>()
        .context("invalid workload configuration")?;

    stresstest::run(scenarios, workloads, config.duration).await?;

    Ok(())
}
