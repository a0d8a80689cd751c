use async_std::net::TcpListener;
use hserve::server::{self, Served};
use hserve::{Config, ConnectionId, DataStatus, Error, HandlerError, MethodSet, Registry};
use hserve::{RequestCtx, ResponseCtx};
use http::Method;
use std::sync::{Arc, Mutex};

#[async_std::main]
async fn main() -> Result<(), Error> {
    let mut l = TcpListener::bind("127.0.0.1:3000").await?;

    println!("Listening to {:?}", l.local_addr()?);
    listen(&mut l, Arc::new(Mutex::new(registry()))).await;

    Ok(())
}

fn registry() -> Registry {
    let mut reg = Registry::new();
    reg.add_static("/", "Hello world!\n", "text/plain");

    // echoes the request body back once it's all in
    let mut body = vec![];
    reg.add_dynamic(
        "/echo",
        MethodSet::of(&[Method::POST, Method::PUT]),
        "application/octet-stream",
        move |status: DataStatus, req: &RequestCtx<'_>| -> Result<ResponseCtx, HandlerError> {
            match status {
                DataStatus::More => {
                    body.extend_from_slice(req.data);
                    Ok(ResponseCtx::new())
                }
                DataStatus::Final => {
                    body.extend_from_slice(req.data);
                    let answer = std::mem::replace(&mut body, vec![]);
                    Ok(ResponseCtx::new().with_body(answer).finished())
                }
                DataStatus::Aborted => {
                    body.clear();
                    Ok(ResponseCtx::new())
                }
            }
        },
    );
    reg
}

async fn listen(l: &mut TcpListener, registry: Arc<Mutex<Registry>>) {
    let config = Arc::new(Config::default());
    let mut next_id = 0;

    loop {
        let (tcp, _) = match l.accept().await {
            Ok(v) => v,
            Err(e) => {
                println!("Accept failed: {}", e);
                continue;
            }
        };

        next_id += 1;
        let id = ConnectionId(next_id);
        let config = config.clone();
        let registry = registry.clone();

        let task = async move {
            match server::serve(tcp, id, config, registry).await {
                Ok(Served::Closed) => {}
                Ok(Served::Detached(_, _)) => println!("{:?} detached", id),
                Err(e) => println!("{:?} failed: {}", id, e),
            }
        };

        async_std::task::spawn(task);
    }
}
