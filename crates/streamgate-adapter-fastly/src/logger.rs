use log::LevelFilter;

/// Timestamps each record with `fern` and hands it to the Fastly log endpoint.
pub fn init_logger(endpoint: &str, level: LevelFilter, echo_stdout: bool) -> anyhow::Result<()> {
    let logger = log_fastly::Logger::builder()
        .default_endpoint(endpoint)
        .echo_stdout(echo_stdout)
        .max_level(level)
        .build()?;

    // UTC keeps the format stable inside the wasm sandbox, which has no local zone.
    fern::Dispatch::new()
        .level(level)
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {}",
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                message
            ))
        })
        .chain(Box::new(logger) as Box<dyn log::Log>)
        .apply()?;
    log::set_max_level(level);
    Ok(())
}
