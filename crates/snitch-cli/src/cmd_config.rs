use std::path::Path;

use serde_json::json;
use snitch_config::SnitchConfig;
use snitch_git::inspector::DEFAULT_UPSTREAM;

pub fn execute(cwd: &Path, as_json: bool) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let settings = rt.block_on(crate::resolve_settings(cwd))?;
    let config_path = SnitchConfig::locate(&settings.repo_root);

    let transport = if settings.pubnub.is_some() {
        "pubnub"
    } else {
        "stdout"
    };

    if as_json {
        let debounce_ms = settings.debounce.as_millis() as u64;
        let throttle_ms = settings.throttle.as_millis() as u64;
        let out = json!({
            "configPath": config_path.as_ref().map(|p| p.display().to_string()),
            "repoRoot": settings.repo_root.display().to_string(),
            "developer": settings.developer,
            "projectKey": settings.project_key,
            "filestatChannel": settings.filestat_channel(),
            "connectionsChannel": settings.connections_channel(),
            "transport": transport,
            "upstream": settings.upstream,
            "filterAuthor": settings.filter_author,
            "debounceMs": debounce_ms,
            "throttleMs": throttle_ms,
            "ignorePatterns": settings.ignore_patterns,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if let Some(path) = &config_path {
        println!("config:       {}", path.display());
    }
    println!("repository:   {}", settings.repo_root.display());
    println!("developer:    {}", settings.developer);
    println!("project key:  {}", settings.project_key);
    println!("channels:     {}, {}", settings.filestat_channel(), settings.connections_channel());
    match &settings.pubnub {
        Some(keys) => println!("transport:    {transport} ({})", keys.origin),
        None => println!("transport:    {transport} (no pubnubKeys)"),
    }
    println!(
        "upstream:     {}",
        settings.upstream.as_deref().unwrap_or(DEFAULT_UPSTREAM)
    );
    println!(
        "timing:       debounce {}ms, throttle {}ms",
        settings.debounce.as_millis(),
        settings.throttle.as_millis()
    );
    println!("ignored:");
    for pattern in &settings.ignore_patterns {
        println!("  {pattern}");
    }
    Ok(())
}
