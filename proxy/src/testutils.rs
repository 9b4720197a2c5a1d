use bytes::Bytes;
use http::header::LOCATION;
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::time::Duration;
use tokio::net::TcpListener;

/// Behaviour of the stand-in upstream.
#[derive(Clone, Copy, Debug)]
pub enum EchoServer {
    /// Returns the request body, with method, URI and every request header
    /// mirrored as `x-echo-*` response headers.
    Echo,
    /// Answers `307` with a fixed `Location`.
    Redirect,
    /// Answers with an empty body and the given status.
    Status(StatusCode),
    /// Waits before answering.
    Stall(Duration),
    /// Answers as soon as the first data frame of the request body arrives,
    /// echoing only that frame.
    FirstChunk,
}

async fn handle(
    mode: EchoServer,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let mut response = Response::new(Full::new(Bytes::new()));

    match mode {
        EchoServer::Echo => {
            let (parts, body) = req.into_parts();
            let body_bytes = body
                .collect()
                .await
                .map(|collected| collected.to_bytes())
                .unwrap_or_else(|_| Bytes::new());

            let headers = response.headers_mut();
            headers.insert(
                "x-echo-method",
                HeaderValue::from_str(parts.method.as_str()).unwrap(),
            );
            headers.insert(
                "x-echo-uri",
                HeaderValue::from_str(&parts.uri.to_string()).unwrap(),
            );
            for (name, value) in parts.headers.iter() {
                let echoed = HeaderName::from_bytes(format!("x-echo-{name}").as_bytes()).unwrap();
                headers.append(echoed, value.clone());
            }
            *response.body_mut() = Full::new(body_bytes);
        }
        EchoServer::Redirect => {
            *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
            response.headers_mut().insert(
                LOCATION,
                HeaderValue::from_static("https://cdn.example.com/blob"),
            );
        }
        EchoServer::Status(status) => {
            *response.status_mut() = status;
        }
        EchoServer::Stall(delay) => {
            tokio::time::sleep(delay).await;
        }
        EchoServer::FirstChunk => {
            let mut body = req.into_body();
            while let Some(Ok(frame)) = body.frame().await {
                if let Ok(data) = frame.into_data() {
                    *response.body_mut() = Full::new(data);
                    break;
                }
            }
        }
    }

    Ok(response)
}

pub async fn start_test_server(mode: EchoServer) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");

    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                if let Err(err) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service_fn(move |req| handle(mode, req)))
                    .await
                {
                    eprintln!("Error serving connection: {:?}", err);
                }
            });
        }
    });

    port
}
