#[tokio::main]
async fn main() {
    quiet_archive::start_server().await;
}
