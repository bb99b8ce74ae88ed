use mock_service::MockConfig;
use prload::ApiClient;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub async fn init(config: MockConfig) -> ApiClient {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("prload=debug,mock_service=info")
            .try_init();
    });

    let addr = mock_service::spawn(config)
        .await
        .expect("Failed to start mock service");

    ApiClient::new(&format!("http://{addr}"), Duration::from_secs(5))
        .expect("Failed to build client")
}
