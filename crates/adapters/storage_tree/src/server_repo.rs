//! Tree implementation of [`ServerRepository`].

use std::future::Future;

use devreg_app::ports::ServerRepository;
use devreg_domain::error::RegistryError;
use devreg_domain::name::ServerName;
use devreg_domain::server::ServerRecord;

use crate::backend::TreeBackend;
use crate::fs;
use crate::layout::SERVER_FILE;

impl ServerRepository for TreeBackend {
    fn get_server(
        &self,
        name: &ServerName,
    ) -> impl Future<Output = Result<Option<ServerRecord>, RegistryError>> + Send {
        let path = self.layout.server_dir(name).join(SERVER_FILE);
        async move {
            let record: Option<ServerRecord> = fs::read_toml(&path).await?;
            Ok(record.map(ServerRecord::normalized))
        }
    }

    fn put_server(
        &self,
        server: &ServerRecord,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let path = self.layout.server_dir(&server.name).join(SERVER_FILE);
        let server = server.clone();
        async move { Ok(fs::write_toml(&path, &server).await?) }
    }

    fn delete_server(
        &self,
        name: &ServerName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let dir = self.layout.server_dir(name);
        let base = self.layout.servers();
        async move {
            let removed = fs::remove_file(&dir.join(SERVER_FILE)).await?;
            fs::prune_empty_dirs(&dir, &base).await;
            Ok(removed)
        }
    }

    fn list_server_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<ServerName>, RegistryError>> + Send {
        let base = self.layout.servers();
        let prefix = prefix.to_string();
        async move {
            let keys = fs::list_keys(&base, 2, &prefix, Some(SERVER_FILE)).await?;
            let mut names = Vec::with_capacity(keys.len());
            // Directory names are canonical; the display name lives in the file.
            for key in keys {
                let record: Option<ServerRecord> =
                    fs::read_toml(&base.join(&key).join(SERVER_FILE)).await?;
                if let Some(record) = record {
                    names.push(record.name);
                }
            }
            Ok(names)
        }
    }
}
