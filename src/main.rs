use bevy::log::{BoxedLayer, LogPlugin};
use bevy::prelude::*;
use bevy::window::WindowResolution;
use std::sync::OnceLock;
use tracing_subscriber::Layer;

use meridian::game::GamePlugin;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Mirror console logs into a non-blocking daily log file.
fn file_log_layer(_app: &mut App) -> Option<BoxedLayer> {
    let appender = tracing_appender::rolling::daily("logs", "meridian.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .boxed(),
    )
}

fn main() {
    App::new()
        .add_plugins(
            DefaultPlugins
                .set(LogPlugin {
                    filter: std::env::var("MERIDIAN_LOG")
                        .unwrap_or_else(|_| "info,wgpu=error,naga=warn".to_string()),
                    custom_layer: file_log_layer,
                    ..default()
                })
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Meridian".into(),
                        resolution: WindowResolution::new(1280, 720),
                        resizable: true,
                        ..default()
                    }),
                    ..default()
                }),
        )
        .add_plugins(GamePlugin)
        .run();
}
