//! Connects one client to every emulated middleware and keeps feeding bytes.
//!
//! Usage: cargo run --example swarm_client -- [count] [base_port]

use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let count: u16 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(100);
    let base_port: u16 = args.next().map(|s| s.parse()).transpose()?.unwrap_or(14567);
    let mut handles = vec![];

    println!(
        "Feeding {} middlewares on ports {}..{}",
        count,
        base_port,
        base_port as u32 + count as u32
    );

    for i in 0..count {
        let Some(port) = base_port.checked_add(i) else {
            break;
        };
        let handle = tokio::spawn(async move {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(mut stream) => {
                    let chunk = [0x42u8; 512];
                    loop {
                        if let Err(e) = stream.write_all(&chunk).await {
                            eprintln!("Port {} stopped accepting data: {}", port, e);
                            break;
                        }
                        sleep(Duration::from_millis(250)).await;
                    }
                }
                Err(e) => eprintln!("Port {} unreachable: {}", port, e),
            }
        });
        handles.push(handle);

        // Small delay to prevent local OS socket exhaustion during setup
        if i % 100 == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    }

    println!("All clients spawned. Ctrl+C to stop.");

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
