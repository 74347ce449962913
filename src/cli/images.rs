//! Image generation command handler.

use anyhow::Result;

use arkmesh::providers::{ArkClient, GenerationApi, SequentialMode};
use arkmesh::Config;

/// Handle `arkmesh images`.
pub(crate) async fn cmd_images(config: &Config, prompt: &str, sequential: bool) -> Result<()> {
    let client = ArkClient::from_config(config)?;
    let mode = if sequential {
        SequentialMode::Auto
    } else {
        SequentialMode::Disabled
    };

    let urls = client.generate_images(prompt, mode).await?;
    if urls.is_empty() {
        println!("No images returned.");
        return Ok(());
    }
    for url in urls {
        println!("{}", url);
    }
    Ok(())
}
