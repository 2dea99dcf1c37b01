use clap::Parser;
use rtsp::session::PortAllocator;
use rtsp::{ClientConfig, RtspError, SessionController};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(
    name = "rtsp-play",
    about = "Connect to an RTSP presentation and count the RTP packets it sends"
)]
struct Args {
    /// Presentation URL (rtsp://host[:port]/path)
    url: String,

    /// How long to play before tearing down
    #[arg(long, short, default_value_t = 10)]
    seconds: u64,

    /// Per-request reply timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    request_timeout_ms: u64,

    /// Wait for one RTP packet before reporting silence, in milliseconds
    #[arg(long, default_value_t = 1000)]
    packet_timeout_ms: u64,

    /// Lowest local RTP port (rounded up to even)
    #[arg(long, default_value_t = 1024)]
    port_low: u16,

    /// One past the highest local RTP port
    #[arg(long, default_value_t = 65536)]
    port_high: u32,
}

/// Shortest gap between keepalives, whatever timeout the server announced.
const MIN_KEEPALIVE: Duration = Duration::from_secs(1);

/// Half the session timeout, never below [`MIN_KEEPALIVE`].
fn keepalive_interval(session_timeout: Option<Duration>) -> Duration {
    session_timeout
        .map(|t| t / 2)
        .unwrap_or(Duration::from_secs(30))
        .max(MIN_KEEPALIVE)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rtsp-play: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), RtspError> {
    let config = ClientConfig {
        request_timeout: Duration::from_millis(args.request_timeout_ms),
        packet_timeout: Duration::from_millis(args.packet_timeout_ms),
        ports: Arc::new(PortAllocator::new(args.port_low, args.port_high)),
        ..ClientConfig::default()
    };
    let controller = SessionController::from_locator(&args.url, config)?;
    controller.connect()?;

    match controller.duration() {
        Some(duration) => println!("duration: {:.3}s", duration.as_secs_f64()),
        None => println!("duration: unknown"),
    }
    for track in controller.tracks() {
        println!(
            "track {}: {} on port {} ({})",
            track.index,
            track.content_descriptor.as_deref().unwrap_or("unknown"),
            track.local_port(),
            track.control_url
        );
    }

    let streams = controller.streams()?;
    controller.start()?;

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = streams
        .into_iter()
        .map(|stream| {
            let done = done.clone();
            thread::spawn(move || {
                let mut packets = 0u64;
                let mut bytes = 0u64;
                while !done.load(Ordering::SeqCst) {
                    match stream.read() {
                        Ok(Some(packet)) => {
                            packets += 1;
                            bytes += packet.len() as u64;
                        }
                        Ok(None) => tracing::debug!(track = stream.index(), "no packets"),
                        Err(e) => {
                            tracing::warn!(track = stream.index(), error = %e, "track ended");
                            break;
                        }
                    }
                }
                (stream.index(), packets, bytes)
            })
        })
        .collect();

    let keepalive_every = keepalive_interval(controller.session_timeout());
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut next_keepalive = Instant::now() + keepalive_every;

    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(200));
        if Instant::now() >= next_keepalive {
            if let Err(e) = controller.keepalive() {
                tracing::warn!(error = %e, "keepalive failed");
            }
            next_keepalive += keepalive_every;
        }
    }

    println!("health: {:?}", controller.health());
    done.store(true, Ordering::SeqCst);
    controller.disconnect();

    for reader in readers {
        match reader.join() {
            Ok((index, packets, bytes)) => {
                println!("track {}: {} packets, {} bytes", index, packets, bytes)
            }
            Err(_) => eprintln!("reader thread panicked"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_at_half_the_timeout() {
        assert_eq!(
            keepalive_interval(Some(Duration::from_secs(60))),
            Duration::from_secs(30)
        );
        assert_eq!(keepalive_interval(None), Duration::from_secs(30));
    }

    #[test]
    fn zero_timeout_does_not_spin() {
        assert_eq!(keepalive_interval(Some(Duration::ZERO)), MIN_KEEPALIVE);
        assert_eq!(keepalive_interval(Some(Duration::from_secs(1))), MIN_KEEPALIVE);
    }
}
