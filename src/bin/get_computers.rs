#[cfg(not(target_arch = "wasm32"))]
mod lambda {
    use std::io::Write;

    use aws_config::BehaviorVersion;
    use lambda_runtime::{run, service_fn, Error, LambdaEvent};
    use log::info;

    use flappy_xr::lookup::{ComputerLookup, DynamoComputerStore, LookupConfig, ProxyRequest};

    pub async fn serve() -> Result<(), Error> {
        init_logging();

        let config = LookupConfig::from_env()?;
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = aws_sdk_dynamodb::Client::new(&sdk_config);
        let store = DynamoComputerStore::new(client, config.table_name.clone());
        info!(
            "serving computer lookups from {} (placeholder {})",
            store.table_name(),
            if config.placeholder.is_some() { "on" } else { "off" }
        );

        let lookup = ComputerLookup::new(store, config);
        let lookup = &lookup;
        run(service_fn(move |event: LambdaEvent<ProxyRequest>| async move {
            Ok::<_, Error>(lookup.handle(&event.payload).await)
        }))
        .await
    }

    // CloudWatch stamps every line itself and does not render ANSI colours.
    fn init_logging() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format(|buf, record| writeln!(buf, "{} {}", record.level(), record.args()))
            .write_style(env_logger::WriteStyle::Never)
            .init();
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    lambda::serve().await
}

#[cfg(target_arch = "wasm32")]
fn main() {}
