pub mod api;
pub mod error;
pub mod note;

pub struct AddrInfo {
    pub addr: String,
    pub port: u16,
}

impl AddrInfo {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }

    pub fn as_url(&self) -> String {
        format!("http://{}:{}", self.addr, self.port)
    }

    pub fn as_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}
