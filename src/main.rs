#[tokio::main]
async fn main() {
    let code = lmc::ops::cli::run().await;
    std::process::exit(code);
}
