use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::rc::Rc;
use std::time::{Duration, Instant};

use bleterm_terminal::{Terminal, TerminalConfig};
use bleterm_transport::Transport;
use bytes::Bytes;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, terminal_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_message, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[cfg(unix)]
pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let transport = bleterm_transport::UdsCentral::new(&args.path);
    send(transport, args, format)
}

#[cfg(not(unix))]
pub fn run(_args: SendArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::new(
        crate::exit::USAGE,
        "send needs Unix domain sockets on this platform",
    ))
}

fn send<T: Transport>(transport: T, args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let config = TerminalConfig {
        frame: args.framing.frame_config()?,
        ..TerminalConfig::default()
    };
    let mut terminal = Terminal::with_config(transport, config)
        .map_err(|err| terminal_error("invalid configuration", err))?;

    let inbox: Rc<RefCell<VecDeque<Bytes>>> = Rc::default();
    let sink = Rc::clone(&inbox);
    terminal.on_receive(move |message| sink.borrow_mut().push_back(message));

    terminal
        .start()
        .map_err(|err| terminal_error("connect failed", err))?;
    terminal
        .poll()
        .map_err(|err| terminal_error("connect failed", err))?;

    let message = resolve_message(&args)?;
    let sent = terminal
        .send(&message)
        .map_err(|err| terminal_error("send failed", err))?;
    tracing::debug!(chunks = sent.chunks, bytes = sent.bytes, "message handed to link");

    if args.wait {
        let reply = wait_for_reply(&mut terminal, &inbox, wait_timeout)?;
        let peer = terminal.peer().unwrap_or("-").to_string();
        print_message(&reply, &peer, format);
    }

    Ok(SUCCESS)
}

fn resolve_message(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

fn wait_for_reply<T: Transport>(
    terminal: &mut Terminal<T>,
    inbox: &RefCell<VecDeque<Bytes>>,
    timeout: Duration,
) -> CliResult<Bytes> {
    let deadline = Instant::now() + timeout;
    loop {
        terminal
            .poll()
            .map_err(|err| terminal_error("receive failed", err))?;

        if let Some(reply) = inbox.borrow_mut().pop_front() {
            return Ok(reply);
        }
        if !terminal.is_connected() {
            return Err(CliError::new(
                FAILURE,
                "receive failed: peripheral disconnected before replying",
            ));
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("receive failed: no reply within {timeout:?}"),
            ));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use bleterm_transport::MockLink;

    use super::*;

    fn connected(link: MockLink) -> (Terminal<MockLink>, Rc<RefCell<VecDeque<Bytes>>>) {
        let mut terminal = Terminal::new(link);
        let inbox: Rc<RefCell<VecDeque<Bytes>>> = Rc::default();
        let sink = Rc::clone(&inbox);
        terminal.on_receive(move |message| sink.borrow_mut().push_back(message));
        terminal.start().unwrap();
        terminal.transport_mut().connect("peripheral");
        terminal.poll().unwrap();
        (terminal, inbox)
    }

    #[test]
    fn wait_returns_first_reply() {
        let (mut terminal, inbox) = connected(MockLink::new());
        terminal.transport_mut().write_from_peer(&b"pong\nextra\n"[..]);

        let reply = wait_for_reply(&mut terminal, &inbox, Duration::from_secs(1)).unwrap();
        assert_eq!(reply, Bytes::from_static(b"pong"));
        assert_eq!(inbox.borrow().len(), 1);
    }

    #[test]
    fn wait_times_out() {
        let (mut terminal, inbox) = connected(MockLink::new());
        let err = wait_for_reply(&mut terminal, &inbox, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn wait_fails_on_disconnect() {
        let (mut terminal, inbox) = connected(MockLink::new());
        terminal.transport_mut().disconnect("peripheral");
        let err = wait_for_reply(&mut terminal, &inbox, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code, FAILURE);
    }
}
