use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bleterm_terminal::{Terminal, TerminalConfig, TerminalError};
use bleterm_transport::Transport;
use bytes::Bytes;

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{terminal_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[cfg(unix)]
pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let transport = bleterm_transport::UdsPeripheral::new(&args.path);
    serve(transport, args, format)
}

#[cfg(not(unix))]
pub fn run(_args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::new(
        crate::exit::USAGE,
        "serve needs Unix domain sockets on this platform",
    ))
}

fn serve<T: Transport>(transport: T, args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let announce_interval = parse_duration(&args.announce_interval)?;
    let config = TerminalConfig {
        frame: args.framing.frame_config()?,
        device_name: args.name.clone(),
        service_id: args.service.clone(),
        characteristic_id: args.characteristic.clone(),
    };
    let mut terminal = Terminal::with_config(transport, config)
        .map_err(|err| terminal_error("invalid configuration", err))?;

    let inbox: Rc<RefCell<VecDeque<Bytes>>> = Rc::default();
    let sink = Rc::clone(&inbox);
    terminal.on_receive(move |message| sink.borrow_mut().push_back(message));

    terminal
        .start()
        .map_err(|err| terminal_error("start failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut received = 0usize;
    let mut last_announce: Option<Instant> = None;

    while running.load(Ordering::SeqCst) {
        terminal
            .poll()
            .map_err(|err| terminal_error("poll failed", err))?;

        let messages: Vec<Bytes> = inbox.borrow_mut().drain(..).collect();
        for message in messages {
            let peer = terminal.peer().unwrap_or("-").to_string();
            print_message(&message, &peer, format);

            if args.echo {
                tracing::info!(size = message.len(), "echoing message");
                reply(&mut terminal, &message)?;
            }

            received = received.saturating_add(1);
            if args.count.is_some_and(|count| received >= count) {
                return Ok(SUCCESS);
            }
        }

        if let Some(text) = &args.announce {
            if !terminal.is_connected() {
                last_announce = None;
            } else if last_announce.is_none_or(|at| at.elapsed() >= announce_interval) {
                reply(&mut terminal, text.as_bytes())?;
                last_announce = Some(Instant::now());
            }
        }

        std::thread::sleep(POLL_INTERVAL);
    }

    Ok(SUCCESS)
}

/// Send while serving. A central that leaves mid-send is not fatal.
fn reply<T: Transport>(terminal: &mut Terminal<T>, message: &[u8]) -> CliResult<()> {
    match terminal.send(message) {
        Ok(_) => Ok(()),
        Err(TerminalError::NotConnected) => {
            tracing::debug!("central gone, reply skipped");
            Ok(())
        }
        Err(TerminalError::Transport(err)) => {
            tracing::warn!(error = %err, "reply failed");
            Ok(())
        }
        Err(err) => Err(terminal_error("send failed", err)),
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
