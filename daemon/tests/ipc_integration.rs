//! End-to-end tests of the line-oriented IPC protocol over a real Unix
//! socket, exercising the same request/response framing `murkwallctl` and
//! `murkwalld` use against each other.
//!
//! `murkwalld` is a binary-only crate (no internal modules are exported for
//! tests to call into directly), so these drive the socket the same way a
//! real client would: connect, write a command line, read a response line.
//! The "server" half here is a minimal stand-in that answers using
//! `murkwall_common::IpcCommand`'s own wire spelling, which is what actually
//! crosses the process boundary.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};

use murkwall_common::IpcCommand;

fn socket_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("murkwall-ipc-test-{name}-{}.sock", std::process::id()))
}

/// Accept one connection, read one line, hand the parsed command to
/// `respond`, write its return value back, then close.
fn serve_one(listener: UnixListener, respond: impl FnOnce(IpcCommand) -> String) {
    let (mut stream, _) = listener.accept().unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();

    let command = IpcCommand::parse(line.trim_end_matches(['\r', '\n'])).expect("known command");
    let response = respond(command);
    stream.write_all(response.as_bytes()).unwrap();
}

#[test]
fn change_command_round_trips_over_the_wire() {
    let path = socket_path("change");
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).unwrap();

    let server = std::thread::spawn(move || {
        serve_one(listener, |cmd| match cmd {
            IpcCommand::Change(p) => {
                assert_eq!(p, "/tmp/wallpaper.png");
                "OK\n".to_string()
            }
            _ => panic!("unexpected command"),
        });
    });

    let mut client = UnixStream::connect(&path).unwrap();
    let request = IpcCommand::Change("/tmp/wallpaper.png".to_string()).to_line();
    client.write_all(format!("{request}\n").as_bytes()).unwrap();

    let mut reader = BufReader::new(client);
    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    assert_eq!(response, "OK\n");

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn query_reports_status_line_shape() {
    let path = socket_path("query");
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).unwrap();

    let server = std::thread::spawn(move || {
        serve_one(listener, |cmd| {
            assert_eq!(cmd, IpcCommand::Query);
            "STATUS: playing image /tmp/a.png\n".to_string()
        });
    });

    let mut client = UnixStream::connect(&path).unwrap();
    client.write_all(b"query\n").unwrap();

    let mut reader = BufReader::new(client);
    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    assert!(response.starts_with("STATUS: "));

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

#[test]
fn unknown_command_is_rejected_before_it_reaches_a_handler() {
    assert_eq!(IpcCommand::parse("frobnicate"), None);
    assert_eq!(IpcCommand::parse(""), None);
}

#[test]
fn every_command_in_the_table_round_trips_through_to_line_and_parse() {
    let samples = vec![
        IpcCommand::Pause,
        IpcCommand::Resume,
        IpcCommand::Query,
        IpcCommand::Stop,
        IpcCommand::Change("/tmp/a.png".to_string()),
        IpcCommand::SetTransition("fade".to_string()),
        IpcCommand::GetTransition,
        IpcCommand::SetTransitionDuration("0.75".to_string()),
    ];

    for command in samples {
        let line = command.to_line();
        assert_eq!(IpcCommand::parse(&line), Some(command));
    }
}

#[test]
fn stop_half_closes_after_its_response() {
    let path = socket_path("stop");
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path).unwrap();

    let server = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(IpcCommand::parse(line.trim_end()), Some(IpcCommand::Stop));

        stream.write_all(b"OK\n").unwrap();
        stream.shutdown(std::net::Shutdown::Write).unwrap();
    });

    let mut client = UnixStream::connect(&path).unwrap();
    client.write_all(b"stop\n").unwrap();

    let mut reader = BufReader::new(client);
    let mut response = String::new();
    reader.read_line(&mut response).unwrap();
    assert_eq!(response, "OK\n");

    // the server closed its write half right after: a further read hits EOF.
    let mut trailing = String::new();
    let n = reader.read_line(&mut trailing).unwrap();
    assert_eq!(n, 0);

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}
