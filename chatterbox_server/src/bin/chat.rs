// Terminal chat client.
//
// Usage:
//   chat <HOST> <PORT>
//
// Prompts for a username and password until the server accepts them, then
// forwards every stdin line to the server and prints whatever the server
// sends. A stdin reader thread feeds lines through an `mpsc` channel so the
// main loop can interleave typing with incoming messages. `/quit`, `/close`
// and `/exit` end the client; so does end of input or the server hanging up.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use chatterbox_protocol::{LoginReply, is_quit_command};
use chatterbox_server::ChatClient;
use clap::Parser;
use tracing::error;

/// How long the main loop waits for typed input before checking the inbox.
const INPUT_POLL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Connect to a chatterbox server")]
struct Args {
    host: String,
    port: u16,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let mut client = match ChatClient::connect((args.host.as_str(), args.port)) {
        Ok(client) => client,
        Err(e) => {
            error!(host = %args.host, port = args.port, "{e}");
            std::process::exit(1);
        }
    };

    let stdin = io::stdin();
    let mut input = stdin.lock().lines();

    loop {
        let Some(username) = prompt(&mut input, "Username: ") else {
            client.abort();
            return;
        };
        let Some(password) = prompt(&mut input, "Password: ") else {
            client.abort();
            return;
        };
        match client.login(&username, &password) {
            Ok(LoginReply::Accepted) => {
                println!("{}", LoginReply::Accepted.as_wire().trim_end());
                break;
            }
            Ok(LoginReply::Refused) => println!("{}", LoginReply::Refused.as_wire().trim_end()),
            Err(e) => {
                error!("login failed: {e}");
                std::process::exit(1);
            }
        }
    }
    drop(input);

    let (tx, typed) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        print_incoming(&client);
        if client.is_closed() {
            println!("Server closed the connection.");
            return;
        }

        let line = match typed.recv_timeout(INPUT_POLL) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if is_quit_command(&line) || line.trim() == "/exit" {
            break;
        }
        if let Err(e) = client.send_line(&line) {
            error!("send failed: {e}");
            return;
        }
    }

    print_incoming(&client);
    client.disconnect();
}

/// Print a prompt and read one trimmed line. `None` on end of input.
fn prompt(input: &mut impl Iterator<Item = io::Result<String>>, label: &str) -> Option<String> {
    print!("{label}");
    let _ = io::stdout().flush();
    input.next()?.ok().map(|line| line.trim().to_owned())
}

fn print_incoming(client: &ChatClient) {
    let frames = client.poll();
    if frames.is_empty() {
        return;
    }
    let mut out = io::stdout().lock();
    for frame in frames {
        let _ = out.write_all(frame.as_bytes());
    }
    let _ = out.flush();
}
