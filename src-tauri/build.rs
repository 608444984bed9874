fn main() {
    // Only these commands get `allow-*` permissions; capabilities grant them.
    tauri_build::try_build(
        tauri_build::Attributes::new().app_manifest(tauri_build::AppManifest::new().commands(&[
            "window_minimize",
            "window_toggle_maximize",
            "window_close",
            "window_is_maximized",
            "window_toggle_devtools",
            "renderer_console_log",
            "desktop_get_version",
            "desktop_get_backend_port",
        ])),
    )
    .expect("failed to run tauri-build");
}
