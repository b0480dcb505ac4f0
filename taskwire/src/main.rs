use std::process::ExitCode;
use std::sync::Arc;

use taskwire::amqp::{AmqpTransport, AmqpTopologyConfig};
use taskwire::cli::{Cli, Mode, TransportKind};
use taskwire::tasks::{Codec, JsonCodec, LoopbackTransport, Namespaces, Stub, Transport};
use taskwire::tracing_layer::{make_layer, Registry, SubscriberExt, SubscriberInitExt, TracingConfig};
use taskwire::App;
use tracing::{error, info};

fn main() -> ExitCode {
    let cli = match Cli::parse(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(error) => {
            eprintln!("taskwire: {error}");
            return ExitCode::FAILURE;
        }
    };

    Registry::default()
        .with(make_layer(&TracingConfig::default()))
        .init();

    let Some(scenario) = taskwire::demos::find(&cli.scenario) else {
        eprintln!("taskwire: unknown scenario '{}'", cli.scenario);
        return ExitCode::FAILURE;
    };

    let exit = Arc::new(std::sync::Mutex::new(ExitCode::SUCCESS));
    let exit_in_main = Arc::clone(&exit);

    App::boot(async move {
        let transport: Arc<dyn Transport> = match cli.transport {
            TransportKind::Loopback => Arc::new(LoopbackTransport::new()),
            TransportKind::Amqp => {
                let config = match &cli.url {
                    Some(url) => match AmqpTopologyConfig::default().with_dsn("default", url) {
                        Ok(config) => config,
                        Err(error) => {
                            error!(%error, "invalid --url");
                            *exit_in_main.lock().unwrap() = ExitCode::FAILURE;
                            return;
                        }
                    },
                    None => AmqpTopologyConfig::default(),
                };
                Arc::new(AmqpTransport::new(config))
            }
        };

        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let router = Namespaces::router(&cli.namespace, false);
        Namespaces::set_codec(&cli.namespace, Arc::clone(&codec));
        Namespaces::set_transport(&cli.namespace, Arc::clone(&transport));

        (scenario.register)(&router, &cli.options);

        if let Err(error) = router.activate(codec, Arc::clone(&transport)).await {
            error!(%error, "failed to activate router");
            *exit_in_main.lock().unwrap() = ExitCode::FAILURE;
            return;
        }

        match cli.mode {
            Mode::Server => {
                info!(namespace = %cli.namespace, scenario = scenario.name, "serving requests");
                taskwire_runtime::AppContext::terminated().await;
            }
            Mode::Client | Mode::Loopback => {
                let task_name = cli.options.get("task").map(String::as_str).unwrap_or("task_three");
                let args = cli
                    .options
                    .get("args")
                    .map(|raw| serde_json::from_str(raw).unwrap_or(serde_json::json!({"a": 1})))
                    .unwrap_or_else(|| serde_json::json!({"a": 1}));

                let stub = Stub::from_router(Arc::clone(&router), task_name);
                match stub.call_value(args).await {
                    Ok(value) => println!("{value}"),
                    Err(error) => {
                        error!(%error, task_name, "call failed");
                        *exit_in_main.lock().unwrap() = ExitCode::FAILURE;
                    }
                }
            }
        }

        let _ = router.deactivate().await;
    });

    let exit = *exit.lock().unwrap();
    exit
}
