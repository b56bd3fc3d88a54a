use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(gesture_analyzer_lib::default_config_path);

    gesture_analyzer_lib::run(config_path).await
}
