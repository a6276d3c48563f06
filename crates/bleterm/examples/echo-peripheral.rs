//! Minimal echo peripheral: advertises on a socket and echoes each message.
//!
//! Run with:
//!   cargo run --example echo-peripheral
//!
//! In another terminal:
//!   cargo run --features cli -- send <printed socket path> \
//!     --data 'hello over a tiny link' --wait

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::Duration;

    use bleterm::terminal::{Terminal, TerminalError};
    use bleterm::transport::UdsPeripheral;

    let sock_dir = std::env::temp_dir().join(format!("bleterm-echo-{}", std::process::id()));
    std::fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let mut terminal = Terminal::new(UdsPeripheral::new(&sock_path));
    terminal.set_device_name("EchoPeripheral")?;

    let inbox = Rc::new(RefCell::new(VecDeque::new()));
    let sink = Rc::clone(&inbox);
    terminal.on_receive(move |message| sink.borrow_mut().push_back(message));
    terminal.on_connect(|peer| eprintln!("Central connected: {peer}"));

    terminal.start()?;
    eprintln!("Advertising on {}", sock_path.display());

    // Serve one central, then exit.
    let mut served = false;
    loop {
        terminal.poll()?;

        let messages: Vec<_> = inbox.borrow_mut().drain(..).collect();
        for message in messages {
            eprintln!("Received {} bytes", message.len());
            match terminal.send(&message) {
                Ok(_) => {}
                // The central wrote and left in the same poll.
                Err(TerminalError::NotConnected) => eprintln!("Central left before the echo"),
                Err(err) => return Err(err.into()),
            }
        }

        if terminal.is_connected() {
            served = true;
        } else if served {
            eprintln!("Central disconnected");
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    drop(terminal);
    let _ = std::fs::remove_dir_all(&sock_dir);
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("echo-peripheral needs Unix domain sockets");
}
