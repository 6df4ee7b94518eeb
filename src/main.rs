use std::path::PathBuf;

use streamcast_lib::config::Config;
use streamcast_lib::logger::init_logging;
use streamcast_lib::server::run_server;

#[tokio::main]
async fn main() {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("加载配置失败: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    if let Err(e) = run_server(&config).await {
        tracing::error!("[SERVER] 服务异常退出: {}", e);
        std::process::exit(1);
    }
}
