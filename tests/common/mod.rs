//! Shared fixtures: a small users controller and helpers for dispatching
//! calls against it.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use metaroute::dispatcher::{ApiResponse, DispatchRequest, Dispatcher, HandlerResponse, RequestContext};
use metaroute::meta::Meta;
use metaroute::router::{Controller, Operations, Router, RouterBuilder};
use metaroute::Describe;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Describe)]
pub struct ListUsersReq {
    #[meta(path:"/users" method:"GET" summary:"List users" tags:"users,admin" dc:"Lists users matching the filters")]
    pub meta: Meta,
    #[tag(dc:"Name filter")]
    pub name: String,
    pub age: i32,
}

#[derive(Debug, Deserialize, Describe)]
pub struct CreateUserReq {
    #[meta(path:"/users" method:"POST" summary:"Create a user" tags:"users")]
    pub meta: Meta,
    pub name: String,
    pub age: i32,
}

#[derive(Debug, Deserialize, Describe)]
pub struct GetUserReq {
    #[meta(path:"/users/{id}" method:"GET" summary:"Fetch one user")]
    pub meta: Meta,
    pub id: u64,
    pub verbose: bool,
}

#[derive(Debug, Deserialize, Describe)]
pub struct StrictReq {
    #[meta(path:"/strict" method:"POST")]
    pub meta: Meta,
    #[tag(v:"required#Name is mandatory")]
    pub name: String,
    #[tag(v:"max:10")]
    pub count: i32,
}

#[derive(Debug, Deserialize, Describe)]
pub struct FailReq {
    #[meta(path:"/fail" method:"GET")]
    pub meta: Meta,
}

#[derive(Debug, Deserialize, Describe)]
pub struct PanicReq {
    #[meta(path:"/panic" method:"GET")]
    pub meta: Meta,
}

#[derive(Debug, Deserialize, Describe)]
pub struct TaggedReq {
    #[meta(path:"/tagged" method:"GET")]
    pub meta: Meta,
}

/// User as returned by the handlers.
#[derive(Debug, Clone, Serialize, Deserialize, Describe)]
pub struct UserRes {
    pub name: String,
    pub age: i32,
}

impl ApiResponse for UserRes {}

#[derive(Debug, Serialize, Describe)]
pub struct TaggedRes {
    pub items: Vec<String>,
}

impl ApiResponse for TaggedRes {
    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-total-count".to_string(), self.items.len().to_string()),
            ("cache-control".to_string(), "no-store".to_string()),
        ]
    }
}

/// Counts handler invocations so tests can assert a handler never ran.
#[derive(Default)]
pub struct Users {
    pub calls: AtomicUsize,
}

impl Controller for Users {
    fn operations(ops: &mut Operations<Self>) {
        ops.add("List", Self::list)
            .add("Create", Self::create)
            .add("Get", Self::get)
            .add("Strict", Self::strict)
            .add("Fail", Self::fail)
            .add("Panic", Self::panic)
            .add("Tagged", Self::tagged);
    }
}

impl Users {
    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn list(&self, _ctx: &RequestContext, req: ListUsersReq) -> anyhow::Result<UserRes> {
        self.hit();
        Ok(UserRes {
            name: req.name,
            age: req.age,
        })
    }

    fn create(&self, _ctx: &RequestContext, req: CreateUserReq) -> anyhow::Result<UserRes> {
        self.hit();
        Ok(UserRes {
            name: req.name,
            age: req.age,
        })
    }

    fn get(&self, ctx: &RequestContext, req: GetUserReq) -> anyhow::Result<UserRes> {
        self.hit();
        assert_eq!(ctx.get_path_param("id"), Some(req.id.to_string().as_str()));
        let name = if req.verbose {
            format!("user-{} (verbose)", req.id)
        } else {
            format!("user-{}", req.id)
        };
        Ok(UserRes { name, age: 0 })
    }

    fn strict(&self, _ctx: &RequestContext, _req: StrictReq) -> anyhow::Result<()> {
        self.hit();
        Ok(())
    }

    fn fail(&self, _ctx: &RequestContext, _req: FailReq) -> anyhow::Result<()> {
        self.hit();
        Err(anyhow!("database unavailable"))
    }

    fn panic(&self, _ctx: &RequestContext, _req: PanicReq) -> anyhow::Result<()> {
        self.hit();
        panic!("handler exploded");
    }

    fn tagged(&self, _ctx: &RequestContext, _req: TaggedReq) -> anyhow::Result<TaggedRes> {
        self.hit();
        Ok(TaggedRes {
            items: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        })
    }
}

pub fn users_router() -> Arc<Router> {
    let mut builder = RouterBuilder::new();
    builder
        .register_controller("/api", Users::default())
        .expect("register users");
    Arc::new(builder.build().expect("build router"))
}

pub fn users_dispatcher() -> Dispatcher {
    Dispatcher::new(users_router())
}

/// Handler invocations recorded by the `Users` controller behind `dispatcher`.
pub fn calls(dispatcher: &Dispatcher) -> usize {
    dispatcher
        .router()
        .controller::<Users>("Users")
        .map(|users| users.calls.load(Ordering::SeqCst))
        .unwrap_or(0)
}

pub fn get(dispatcher: &Dispatcher, target: &str) -> HandlerResponse {
    dispatcher.dispatch(DispatchRequest::new(http::Method::GET, target))
}

pub fn post(dispatcher: &Dispatcher, target: &str, body: &str) -> HandlerResponse {
    dispatcher.dispatch(
        DispatchRequest::new(http::Method::POST, target)
            .with_header("content-type", "application/json")
            .with_body(body),
    )
}
