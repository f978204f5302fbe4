use hw_backend_mock::{MockBackend, MockBackendOptions, PortInfo, DEFAULT_ADDR};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn parse_arg_value(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();

    let addr = parse_arg_value(&args, "--addr")
        .or_else(|| std::env::var("HW_MOCK_ADDR").ok())
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let addr_file = parse_arg_value(&args, "--addr-file").map(PathBuf::from);
    let run_for_ms = parse_arg_value(&args, "--run-for-ms")
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis);
    let mute_list = args.iter().any(|a| a == "--mute-list");

    let options = MockBackendOptions {
        addr,
        ports: vec![
            PortInfo {
                name: "COM1".to_string(),
                desc: "Loopback serial port".to_string(),
            },
            PortInfo {
                name: "COM2".to_string(),
                desc: "Loopback serial port".to_string(),
            },
        ],
        answer_port_listing: !mute_list,
    };

    let backend = match MockBackend::spawn(options) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Some(path) = &addr_file {
        let _ = fs::write(path, backend.listen_addr().to_string());
    }

    println!("mock_backend listening on {}", backend.url());

    let start = Instant::now();
    loop {
        thread::sleep(Duration::from_millis(50));
        if let Some(max) = run_for_ms {
            if start.elapsed() >= max {
                break;
            }
        }
    }

    backend.shutdown();
}
