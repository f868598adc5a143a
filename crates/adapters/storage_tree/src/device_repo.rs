//! Tree implementation of [`DeviceRepository`].

use std::future::Future;

use devreg_app::ports::DeviceRepository;
use devreg_domain::device::Device;
use devreg_domain::error::RegistryError;
use devreg_domain::name::{AliasName, DeviceName};

use crate::backend::TreeBackend;
use crate::error::StorageError;
use crate::fs;
use crate::layout::DEVICE_FILE;

impl TreeBackend {
    /// Devices whose key starts with `prefix` and whose directory holds `file`.
    pub(crate) async fn device_keys(
        &self,
        prefix: &str,
        file: &str,
    ) -> Result<Vec<DeviceName>, StorageError> {
        let keys = fs::list_keys(&self.layout.devices(), 3, prefix, Some(file)).await?;
        Ok(keys
            .iter()
            .map(|key| DeviceName::parse(key))
            .collect::<Result<Vec<_>, _>>()?)
    }
}

impl DeviceRepository for TreeBackend {
    fn get_device(
        &self,
        name: &DeviceName,
    ) -> impl Future<Output = Result<Option<Device>, RegistryError>> + Send {
        let path = self.layout.device_dir(name).join(DEVICE_FILE);
        async move { Ok(fs::read_toml(&path).await?) }
    }

    fn put_device(&self, device: &Device) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let path = self.layout.device_dir(&device.name).join(DEVICE_FILE);
        let device = device.clone();
        async move { Ok(fs::write_toml(&path, &device).await?) }
    }

    fn delete_device(
        &self,
        name: &DeviceName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let dir = self.layout.device_dir(name);
        let base = self.layout.devices();
        async move {
            let removed = fs::remove_file(&dir.join(DEVICE_FILE)).await?;
            fs::prune_empty_dirs(&dir, &base).await;
            Ok(removed)
        }
    }

    fn list_device_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<DeviceName>, RegistryError>> + Send {
        let backend = self.clone();
        let prefix = prefix.to_string();
        async move { Ok(backend.device_keys(&prefix, DEVICE_FILE).await?) }
    }

    fn find_device_by_alias(
        &self,
        alias: &AliasName,
    ) -> impl Future<Output = Result<Option<Device>, RegistryError>> + Send {
        let backend = self.clone();
        let alias = alias.clone();
        async move {
            // Aliases are not indexed on disk: scan every device record.
            for name in backend.device_keys("", DEVICE_FILE).await? {
                let path = backend.layout.device_dir(&name).join(DEVICE_FILE);
                let device: Option<Device> = fs::read_toml(&path).await?;
                if let Some(device) = device
                    && device.alias.as_ref() == Some(&alias)
                {
                    return Ok(Some(device));
                }
            }
            Ok(None)
        }
    }
}
