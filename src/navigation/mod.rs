//! Dashboard navigation
//!
//! Opens a tenant's dashboard in an external window, reusing the window
//! already opened for that tenant while it is still alive. At most one handle
//! is tracked per tenant.

use std::collections::HashMap;
use std::process::{Child, Command};
use std::sync::{Arc, Mutex};

use crate::{
    Error, Result,
    config::SiteRegistry,
    types::{RouteResponse, TenantId},
};

/// An opened external window
pub trait WindowHandle: Send + std::fmt::Debug {
    /// Whether the window can still be reused
    fn is_live(&mut self) -> bool;

    /// Bring the window forward and point it at `url`
    fn navigate(&mut self, url: &str) -> Result<()>;
}

/// Something that can open external windows
pub trait WindowHost: Send + Sync + std::fmt::Debug {
    fn open(&self, url: &str) -> Result<Box<dyn WindowHandle>>;
}

/// Host that launches an opener program (`xdg-open`, `open`, a browser)
///
/// Liveness follows the opener process. Openers that hand the URL to a
/// running browser and exit count as closed right away, so only an opener that
/// stays in the foreground (a browser binary) gets its window reused.
#[derive(Debug, Clone)]
pub struct CommandHost {
    program: String,
}

impl CommandHost {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn launch(&self, url: &str) -> Result<Child> {
        Command::new(&self.program).arg(url).spawn().map_err(|e| {
            Error::internal(format!("failed to launch {} for {}: {}", self.program, url, e))
        })
    }
}

impl WindowHost for CommandHost {
    fn open(&self, url: &str) -> Result<Box<dyn WindowHandle>> {
        let child = self.launch(url)?;
        Ok(Box::new(ProcessWindow::new(self.clone(), child)))
    }
}

/// Window backed by the opener's child process
///
/// Openers replaced by `navigate` are kept until they exit so they get reaped.
#[derive(Debug)]
struct ProcessWindow {
    host: CommandHost,
    child: Child,
    retired: Vec<Child>,
}

impl ProcessWindow {
    fn new(host: CommandHost, child: Child) -> Self {
        Self {
            host,
            child,
            retired: Vec::new(),
        }
    }

    fn reap(&mut self) {
        self.retired
            .retain_mut(|child| matches!(child.try_wait(), Ok(None)));
    }
}

impl WindowHandle for ProcessWindow {
    fn is_live(&mut self) -> bool {
        self.reap();
        matches!(self.child.try_wait(), Ok(None))
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        // Re-invoking the opener focuses the running window
        let previous = std::mem::replace(&mut self.child, self.host.launch(url)?);
        self.retired.push(previous);
        self.reap();
        Ok(())
    }
}

impl Drop for ProcessWindow {
    fn drop(&mut self) {
        let _ = self.child.try_wait();
        self.reap();
    }
}

/// Routes tenants to their dashboards
#[derive(Debug)]
pub struct NavigationRouter {
    registry: Arc<SiteRegistry>,
    host: Arc<dyn WindowHost>,
    windows: Mutex<HashMap<TenantId, Box<dyn WindowHandle>>>,
}

impl NavigationRouter {
    pub fn new(registry: Arc<SiteRegistry>, host: Arc<dyn WindowHost>) -> Self {
        Self {
            registry,
            host,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Show a tenant's dashboard, reusing its window when it is still open
    pub fn route(&self, tenant_id: TenantId) -> Result<RouteResponse> {
        let tenant = self.registry.get(tenant_id)?;
        let url = tenant.dashboard_url().to_string();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(window) = windows.get_mut(&tenant_id)
            && window.is_live()
        {
            match window.navigate(&url) {
                Ok(()) => {
                    tracing::debug!("Reusing window for {}", tenant.name);
                    return Ok(RouteResponse {
                        tenant_id,
                        url,
                        reused: true,
                    });
                }
                Err(e) => tracing::warn!("Window for {} unusable: {}", tenant.name, e),
            }
        }

        windows.remove(&tenant_id);
        let window = self.host.open(&url)?;
        windows.insert(tenant_id, window);
        tracing::info!("Opened {} at {}", tenant.name, url);
        Ok(RouteResponse {
            tenant_id,
            url,
            reused: false,
        })
    }

    /// Number of tracked windows
    pub fn tracked(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
