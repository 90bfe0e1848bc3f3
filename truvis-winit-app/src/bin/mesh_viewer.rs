use truvis_winit_app::app::WinitApp;

fn main() {
    if let Err(e) = WinitApp::run() {
        log::error!("fatal error: {:?}", e);
        std::process::exit(1);
    }
}
