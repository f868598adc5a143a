//! Tree implementation of [`ExportRepository`].

use std::future::Future;

use devreg_app::ports::ExportRepository;
use devreg_domain::error::RegistryError;
use devreg_domain::export::ExportRecord;
use devreg_domain::name::DeviceName;

use crate::backend::TreeBackend;
use crate::fs;
use crate::layout::EXPORT_FILE;

impl ExportRepository for TreeBackend {
    fn get_export(
        &self,
        device: &DeviceName,
    ) -> impl Future<Output = Result<Option<ExportRecord>, RegistryError>> + Send {
        let path = self.layout.device_dir(device).join(EXPORT_FILE);
        async move { Ok(fs::read_toml(&path).await?) }
    }

    fn put_export(
        &self,
        export: &ExportRecord,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let path = self.layout.device_dir(&export.device).join(EXPORT_FILE);
        let export = export.clone();
        async move { Ok(fs::write_toml(&path, &export).await?) }
    }

    fn delete_export(
        &self,
        device: &DeviceName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let dir = self.layout.device_dir(device);
        let base = self.layout.devices();
        async move {
            let removed = fs::remove_file(&dir.join(EXPORT_FILE)).await?;
            fs::prune_empty_dirs(&dir, &base).await;
            Ok(removed)
        }
    }

    fn list_exported_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<DeviceName>, RegistryError>> + Send {
        let backend = self.clone();
        let prefix = prefix.to_string();
        async move { Ok(backend.device_keys(&prefix, EXPORT_FILE).await?) }
    }
}
