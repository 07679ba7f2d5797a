#[cfg(not(target_os = "windows"))]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixListener;
    use std::path::PathBuf;
    use std::thread;

    use color_eyre::Result;
    use pretty_assertions::assert_eq;
    use stevedore_lib::prelude::*;
    use stevedore_lib::transport::protocol::{Output, STDERR, STDOUT};

    /// The wire bytes of one attach stream frame.
    fn frame(stream_id: u8, payload: &[u8]) -> Vec<u8> {
        let mut data = vec![stream_id, 0, 0, 0];
        data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        data.extend_from_slice(payload);
        data
    }

    fn temporary_socket_path() -> (tempfile::TempDir, PathBuf) {
        let tempdir = tempfile::tempdir().expect("Couldn't create tempdir");
        let socket_path = tempdir.path().join("stevedore.socket");
        (tempdir, socket_path)
    }

    /// This tests whether we can create a listener and client that
    /// communicate via unix sockets.
    #[test]
    fn test_unix_socket_roundtrip() -> Result<()> {
        better_panic::install();
        let (_tempdir, socket_path) = temporary_socket_path();
        let listener = UnixListener::bind(&socket_path)?;

        // Spawn a sub thread that:
        // 1. Accepts a new connection
        // 2. Reads a message
        // 3. Sends the same message back
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut buffer = [0u8; 5];
            stream.read_exact(&mut buffer).unwrap();
            stream.write_all(&buffer).unwrap();
        });

        let mut client = get_client_stream(ConnectionSettings::UnixSocket {
            path: socket_path,
        })?;

        client.write_all(b"hello")?;
        client.flush()?;

        let response = read_exactly(&mut client, 5)?;
        assert_eq!(response, b"hello".to_vec());

        Ok(())
    }

    /// The full client path for an attach: adapter, pool, connection,
    /// upgrade request, and the demultiplexed stream coming back.
    #[test]
    fn test_attach_stream_end_to_end() -> Result<()> {
        better_panic::install();
        let (_tempdir, socket_path) = temporary_socket_path();
        let listener = UnixListener::bind(&socket_path)?;

        // The daemon side: read the request head, then stream frames and
        // hang up.
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            let mut request = Vec::new();
            let mut buffer = [0u8; 256];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read_bytes = stream.read(&mut buffer).unwrap();
                if read_bytes == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..read_bytes]);
            }

            stream.write_all(&frame(STDOUT, b"hello ")).unwrap();
            stream.write_all(&frame(STDOUT, b"world")).unwrap();
            stream.write_all(&frame(STDERR, b"err")).unwrap();

            String::from_utf8(request).unwrap()
        });

        let adapter = TransportAdapter::unix(
            &format!("http+unix://{}", socket_path.display()),
            &AdapterSettings::default(),
        );

        let pool = adapter.get_connection("http+unix://localhost");
        let mut connection = pool.get();
        connection.put_request(
            "POST",
            &adapter.request_url("http+unix://localhost/v1.41/containers/main/attach?stream=1"),
        )?;
        connection.put_header("Connection", &["Upgrade"]);
        connection.put_header("Upgrade", &["tcp"]);
        connection.end_headers()?;
        assert!(connection.disable_buffering());

        // Decode the multiplexed stream until the daemon hangs up.
        let stream = connection.stream_mut().expect("connection is established");
        let output = consume_socket_output(frames_iter(stream, false), true)?;

        assert_eq!(
            output,
            Output::Demuxed {
                stdout: Some(b"hello world".to_vec()),
                stderr: Some(b"err".to_vec()),
            }
        );

        // The daemon saw a path-only request with the upgrade headers.
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /v1.41/containers/main/attach?stream=1 HTTP/1.1\r\n"));
        assert!(request.contains("Connection: Upgrade\r\n"));
        assert!(request.contains("Upgrade: tcp\r\n"));

        Ok(())
    }

    /// Upgraded connections don't go back into their pool.
    #[test]
    fn test_upgraded_connections_are_not_pooled() -> Result<()> {
        better_panic::install();
        let (_tempdir, socket_path) = temporary_socket_path();
        let listener = UnixListener::bind(&socket_path)?;

        // The daemon side only has to accept; the test checks the pool's
        // bookkeeping, not the sockets.
        thread::spawn(move || {
            let _connection = listener.accept().unwrap();
        });

        let adapter = TransportAdapter::unix(
            &format!("http+unix://{}", socket_path.display()),
            &AdapterSettings::default(),
        );
        let pool = adapter.get_connection("http+unix://localhost");

        // A plain connection is reused.
        let mut connection = pool.get();
        connection.connect()?;
        pool.put(connection);
        assert_eq!(pool.idle_connections(), 1);

        // An upgraded one is dropped.
        let mut connection = pool.get();
        if !connection.is_connected() {
            connection.connect()?;
        }
        connection.put_header("Connection", &["Upgrade"]);
        pool.put(connection);
        assert_eq!(pool.idle_connections(), 0);

        Ok(())
    }
}
