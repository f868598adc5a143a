//! Tree implementation of [`ClassRepository`].

use std::future::Future;

use devreg_app::ports::ClassRepository;
use devreg_domain::class::DeviceClass;
use devreg_domain::error::RegistryError;
use devreg_domain::name::ClassName;

use crate::backend::TreeBackend;
use crate::fs;
use crate::layout::CLASS_FILE;

impl ClassRepository for TreeBackend {
    fn get_class(
        &self,
        name: &ClassName,
    ) -> impl Future<Output = Result<Option<DeviceClass>, RegistryError>> + Send {
        let path = self.layout.class_dir(name).join(CLASS_FILE);
        async move { Ok(fs::read_toml(&path).await?) }
    }

    fn put_class(
        &self,
        class: &DeviceClass,
    ) -> impl Future<Output = Result<(), RegistryError>> + Send {
        let path = self.layout.class_dir(&class.name).join(CLASS_FILE);
        let class = class.clone();
        async move { Ok(fs::write_toml(&path, &class).await?) }
    }

    fn delete_class(
        &self,
        name: &ClassName,
    ) -> impl Future<Output = Result<bool, RegistryError>> + Send {
        let dir = self.layout.class_dir(name);
        let base = self.layout.classes();
        async move {
            let removed = fs::remove_file(&dir.join(CLASS_FILE)).await?;
            fs::prune_empty_dirs(&dir, &base).await;
            Ok(removed)
        }
    }

    fn list_class_names(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<ClassName>, RegistryError>> + Send {
        let base = self.layout.classes();
        let prefix = prefix.to_string();
        async move {
            let keys = fs::list_keys(&base, 1, &prefix, Some(CLASS_FILE)).await?;
            let mut names = Vec::with_capacity(keys.len());
            for key in keys {
                let class: Option<DeviceClass> =
                    fs::read_toml(&base.join(&key).join(CLASS_FILE)).await?;
                if let Some(class) = class {
                    names.push(class.name);
                }
            }
            Ok(names)
        }
    }
}
