mod capture;
mod host;
mod pump;
#[cfg(feature = "rpi")]
mod rpi;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
