// TLS end-to-end tests against a loopback ser2sock server
//
// Fixtures in tests/fixtures were generated with:
// openssl genpkey -algorithm EC -pkeyopt ec_paramgen_curve:P-256 -out ca.key
// openssl req -x509 -new -key ca.key -subj "/CN=ad2sock test CA" -out ca.pem \
//   -not_before 20200101000000Z -not_after 21200101000000Z \
//   -addext "basicConstraints=critical,CA:TRUE" -addext "keyUsage=critical,keyCertSign,cRLSign"
// openssl genpkey -algorithm EC -pkeyopt ec_paramgen_curve:P-256 -out server.key
// openssl req -new -key server.key -subj "/CN=localhost" -out server.csr
// openssl x509 -req -in server.csr -CA ca.pem -CAkey ca.key -out server.pem \
//   -not_before 20200101000000Z -not_after 21200101000000Z \
//   -extfile <(printf 'basicConstraints=critical,CA:FALSE\nextendedKeyUsage=serverAuth\nsubjectAltName=DNS:localhost,IP:127.0.0.1')

use std::sync::Arc;
use std::time::Duration;

use ad2sock::{Ad2Error, Client, ClientConfig};
use rustls::pki_types::CertificateDer;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

const CA_PEM: &[u8] = include_bytes!("fixtures/ca.pem");
const SERVER_PEM: &[u8] = include_bytes!("fixtures/server.pem");
const SERVER_KEY: &[u8] = include_bytes!("fixtures/server.key");

const BANNER: &str = "!SER2SOCK Connected\r\n";
const FAULT_5: &str = "!KPM:[00000001100000003A--],005,[f70600051008001c28020000000000],\"FAULT 05 FRONT DOOR\"\r\n";

fn load_certs(pem: &[u8]) -> Vec<CertificateDer<'static>> {
    rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn server_tls() -> TlsAcceptor {
    let key = rustls_pemfile::private_key(&mut &SERVER_KEY[..])
        .unwrap()
        .unwrap();
    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(load_certs(SERVER_PEM), key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

fn client_tls() -> Arc<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    for cert in load_certs(CA_PEM) {
        roots.add(cert).unwrap();
    }
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// TLS server that sends the banner, then `FAULT_5` once `go` fires, then
/// closes. A failed handshake ends the task quietly.
async fn serve_tls() -> (u16, oneshot::Sender<()>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = server_tls();
    let (go_tx, go_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let Ok(mut stream) = acceptor.accept(socket).await else {
            return;
        };
        stream.write_all(BANNER.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        if go_rx.await.is_err() {
            return;
        }
        stream.write_all(FAULT_5.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        let _ = stream.shutdown().await;
    });

    (port, go_tx, handle)
}

#[tokio::test]
async fn test_banner_and_keypad_line_over_tls() {
    let (port, go, server) = serve_tls().await;

    let config = ClientConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .tls(client_tls())
        .tls_server_name("localhost")
        .banner_timeout_ms(2000)
        .build();
    let client = Client::connect(config).await.unwrap();
    assert_eq!(client.banner(), "!SER2SOCK Connected");

    let mut sub = client.subscribe();
    go.send(()).unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .unwrap()
        .unwrap();
    let keypad = msg.as_keypad().unwrap();
    assert_eq!(keypad.zone(), 5);
    assert_eq!(keypad.text, "FAULT 05 FRONT DOOR");

    assert!(sub.recv().await.is_none());
    server.await.unwrap();
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_server_name_defaults_to_ip_host() {
    // The certificate also carries 127.0.0.1 as an IP SAN.
    let (port, go, server) = serve_tls().await;

    let config = ClientConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .tls(client_tls())
        .build();
    let client = Client::connect(config).await.unwrap();
    let mut sub = client.subscribe();
    go.send(()).unwrap();

    assert!(sub.recv().await.unwrap().as_keypad().is_some());
    server.await.unwrap();
}

#[tokio::test]
async fn test_certificate_name_mismatch_fails_connect() {
    let (port, _go, _server) = serve_tls().await;

    let config = ClientConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .tls(client_tls())
        .tls_server_name("alarmdecoder.example")
        .build();
    match Client::connect(config).await {
        Err(Ad2Error::Io(_)) => {}
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("connect should fail certificate verification"),
    }
}
