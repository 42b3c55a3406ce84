//! In-memory users API served by the demo.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use metaroute::dispatcher::{ApiResponse, RequestContext};
use metaroute::meta::Meta;
use metaroute::router::{Controller, Operations};
use metaroute::Describe;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, Describe)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub age: u32,
}

impl ApiResponse for User {}

#[derive(Debug, Deserialize, Describe)]
pub struct ListUsersReq {
    #[meta(path:"/users" method:"GET" summary:"List users" tags:"users" dc:"Lists users, optionally filtered by name and age")]
    pub meta: Meta,
    /// Exact name filter; empty lists everyone
    pub name: String,
    #[tag(dc:"Only users of this age")]
    pub age: Option<u32>,
}

#[derive(Debug, Serialize, Describe)]
pub struct ListUsersRes {
    pub users: Vec<User>,
    pub total: usize,
}

impl ApiResponse for ListUsersRes {}

#[derive(Debug, Deserialize, Describe)]
pub struct GetUserReq {
    #[meta(path:"/users/{id}" method:"GET" summary:"Fetch one user" tags:"users")]
    pub meta: Meta,
    pub id: u64,
}

#[derive(Debug, Deserialize, Describe)]
pub struct CreateUserReq {
    #[meta(path:"/users" method:"POST" summary:"Create a user" tags:"users")]
    pub meta: Meta,
    #[tag(v:"required|max-length:64")]
    pub name: String,
    #[tag(v:"max:150")]
    pub age: u32,
}

#[derive(Debug, Serialize, Describe)]
pub struct CreateUserRes {
    #[serde(flatten)]
    pub user: User,
}

impl ApiResponse for CreateUserRes {
    fn headers(&self) -> Vec<(String, String)> {
        vec![("location".to_string(), format!("/api/users/{}", self.user.id))]
    }
}

#[derive(Debug, Deserialize, Describe)]
pub struct DeleteUserReq {
    #[meta(path:"/users/{id}" method:"DELETE" summary:"Remove a user" tags:"users")]
    pub meta: Meta,
    pub id: u64,
}

#[derive(Default)]
pub struct UsersController {
    next_id: AtomicU64,
    users: Mutex<BTreeMap<u64, User>>,
}

impl Controller for UsersController {
    fn name(&self) -> &'static str {
        "Users"
    }

    fn operations(ops: &mut Operations<Self>) {
        ops.add("List", Self::list)
            .add("Get", Self::get)
            .add("Create", Self::create)
            .add("Delete", Self::delete);
    }
}

impl UsersController {
    /// Controller pre-filled with a couple of users.
    pub fn seeded() -> Result<Self> {
        let controller = Self::default();
        for (name, age) in [("Ann", 34), ("Bob", 27)] {
            controller.insert(name.to_string(), age)?;
        }
        Ok(controller)
    }

    fn insert(&self, name: String, age: u32) -> Result<User> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let user = User { id, name, age };
        self.users
            .lock()
            .map_err(|_| anyhow!("user store poisoned"))?
            .insert(id, user.clone());
        Ok(user)
    }

    fn list(&self, _ctx: &RequestContext, req: ListUsersReq) -> Result<ListUsersRes> {
        let users: Vec<User> = self
            .users
            .lock()
            .map_err(|_| anyhow!("user store poisoned"))?
            .values()
            .filter(|u| req.name.is_empty() || u.name == req.name)
            .filter(|u| req.age.map_or(true, |age| u.age == age))
            .cloned()
            .collect();
        Ok(ListUsersRes {
            total: users.len(),
            users,
        })
    }

    fn get(&self, _ctx: &RequestContext, req: GetUserReq) -> Result<User> {
        self.users
            .lock()
            .map_err(|_| anyhow!("user store poisoned"))?
            .get(&req.id)
            .cloned()
            .ok_or_else(|| anyhow!("user {} not found", req.id))
    }

    fn create(&self, ctx: &RequestContext, req: CreateUserReq) -> Result<CreateUserRes> {
        let user = self.insert(req.name, req.age)?;
        info!(request_id = %ctx.request_id, user_id = user.id, "User created");
        Ok(CreateUserRes { user })
    }

    fn delete(&self, ctx: &RequestContext, req: DeleteUserReq) -> Result<()> {
        let removed = self
            .users
            .lock()
            .map_err(|_| anyhow!("user store poisoned"))?
            .remove(&req.id);
        match removed {
            Some(_) => {
                info!(request_id = %ctx.request_id, user_id = req.id, "User deleted");
                Ok(())
            }
            None => Err(anyhow!("user {} not found", req.id)),
        }
    }
}
