//! Console logging for the wasm build.

use tracing::Level;
use tracing::subscriber::set_global_default;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::SubscriberExt;

/// Install the panic hook and a console tracing subscriber.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_logging(max_level: Level) {
    console_error_panic_hook::set_once();

    let wasm_layer = tracing_wasm::WASMLayer::new(
        tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(max_level)
            .build(),
    );
    let registry = Registry::default().with(wasm_layer);
    if set_global_default(registry).is_err() {
        tracing::debug!(target: "weaver::dom", "tracing subscriber already installed");
    }
}
