//! Drives one VM through create, status and delete against a running server.
//!
//! ```sh
//! cargo run -p vmapi-server --example client -- \
//!     --base-image /var/lib/libvirt/images/ubuntu.qcow2
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::path::PathBuf;
use tokio::net::TcpStream;
use vmapi_core::VmCreationRequest;

#[derive(Parser, Debug)]
#[command(about = "Create, inspect and delete a VM through the vmapi server")]
struct Args {
    /// Server address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    server: String,
    /// Base image to clone.
    #[arg(long)]
    base_image: PathBuf,
    #[arg(long, default_value_t = 2)]
    vcpus: u32,
    /// Memory in MB.
    #[arg(long, default_value_t = 2048)]
    memory: u32,
    /// Disk size in GB.
    #[arg(long, default_value_t = 20)]
    disk_size: u32,
}

/// Minimal HTTP/1 client, one connection per request.
struct ApiClient {
    server: String,
}

impl ApiClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Value)> {
        let stream = TcpStream::connect(&self.server)
            .await
            .with_context(|| format!("failed to connect to {}", self.server))?;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .context("HTTP handshake failed")?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("Connection closed: {}", e);
            }
        });

        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("Host", self.server.as_str());
        if body.is_some() {
            builder = builder.header("Content-Type", "application/json");
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .context("failed to build request")?;

        let response = sender
            .send_request(request)
            .await
            .context("failed to send request")?;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .context("failed to read response")?
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("failed to parse response")?
        };
        Ok((status, value))
    }

    /// Send a request and fail unless the server answers with `expected`.
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        expected: StatusCode,
    ) -> Result<Value> {
        let (status, value) = self.request(method.clone(), path, body).await?;
        if status != expected {
            let message = value["error"]["message"].as_str().unwrap_or("no error message");
            anyhow::bail!("{method} {path} returned {status}: {message}");
        }
        Ok(value)
    }
}

fn text(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let args = Args::parse();
    let client = ApiClient {
        server: args.server,
    };

    let request = VmCreationRequest {
        vcpus: args.vcpus,
        memory: args.memory,
        disk_size: args.disk_size,
        base_image: args.base_image,
        cpu_pinning: None,
        io_limits: None,
    };
    let created = client
        .call(
            Method::POST,
            "/vms",
            Some(serde_json::to_vec(&request)?),
            StatusCode::CREATED,
        )
        .await?;
    let vm_id = created["vm_id"]
        .as_str()
        .context("create response has no vm_id")?
        .to_string();
    tracing::info!(
        vm_id = %vm_id,
        mac = text(&created["mac_address"]),
        disk = text(&created["disk_file"]),
        "VM created"
    );

    let status = client
        .call(
            Method::GET,
            &format!("/vms/{vm_id}/status"),
            None,
            StatusCode::OK,
        )
        .await?;
    tracing::info!(
        vm_id = %vm_id,
        status = text(&status["status"]),
        "{}",
        text(&status["message"])
    );

    let deleted = client
        .call(Method::DELETE, &format!("/vms/{vm_id}"), None, StatusCode::OK)
        .await?;
    tracing::info!(
        vm_id = %vm_id,
        disk = text(&deleted["disk_file"]),
        "{}",
        text(&deleted["message"])
    );

    Ok(())
}
