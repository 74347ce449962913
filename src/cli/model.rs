//! Model task command handlers.

use std::future::Future;

use anyhow::{Context, Result};

use arkmesh::archive::HttpDownloader;
use arkmesh::providers::{ArkClient, GenerationApi};
use arkmesh::tasks::TaskPoller;
use arkmesh::{generate_model, Config, FetchedModel, ModelCache, ModelFetcher};

use super::{ctrl_c_shutdown, ModelAction};

/// Handle `arkmesh model` subcommands.
pub(crate) async fn cmd_model(config: &Config, action: ModelAction) -> Result<()> {
    match action {
        ModelAction::Create { image_url } => {
            let client = ArkClient::from_config(config)?;
            let task = client.create_model_task(&image_url).await?;
            println!("{}", task.id);
        }
        ModelAction::Status { task_id, wait } => {
            let client = ArkClient::from_config(config)?;
            if wait {
                let poller = TaskPoller::from_config(&client, &config.poll);
                let content = poller
                    .wait_for_completion(&task_id, Some(ctrl_c_shutdown()))
                    .await?;
                println!("Status: succeeded");
                match content.file_url {
                    Some(url) => println!("File URL: {}", url),
                    None => println!("File URL: (none)"),
                }
            } else {
                let snapshot = client.get_task(&task_id).await?;
                println!("Task: {}", snapshot.id);
                println!("Status: {}", snapshot.status);
                if let Some(url) = snapshot.content.and_then(|c| c.file_url) {
                    println!("File URL: {}", url);
                }
                if let Some(err) = snapshot.error {
                    println!("Error: {}", err);
                }
            }
        }
        ModelAction::Fetch { file_url } => {
            let fetcher = build_fetcher(config)?;
            let model = until_interrupted(fetcher.fetch(&file_url)).await?;
            print_model(&model);
        }
        ModelAction::Generate { image_url } => {
            let client = ArkClient::from_config(config)?;
            let poller = TaskPoller::from_config(&client, &config.poll);
            let fetcher = build_fetcher(config)?;
            let model = until_interrupted(generate_model(
                &client,
                &poller,
                &fetcher,
                &image_url,
                Some(ctrl_c_shutdown()),
            ))
            .await?;
            print_model(&model);
        }
    }
    Ok(())
}

fn build_fetcher(config: &Config) -> Result<ModelFetcher<HttpDownloader>> {
    let cache = ModelCache::from_config(&config.cache)
        .with_context(|| "Failed to open model cache")?;
    let downloader = HttpDownloader::new(config.api.timeout(), config.api.timeout())?;
    Ok(ModelFetcher::new(cache, downloader, &config.cache))
}

/// Drop `work` on Ctrl-C. Dropping a fetch removes its temporary directory.
async fn until_interrupted<T>(work: impl Future<Output = arkmesh::Result<T>>) -> Result<T> {
    tokio::select! {
        result = work => Ok(result?),
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
    }
}

fn print_model(model: &FetchedModel) {
    let source = if model.from_cache { "cache" } else { "download" };
    println!("Model ({}): {}", source, model.path.display());
    println!("URL: {}", model.file_url);
}
