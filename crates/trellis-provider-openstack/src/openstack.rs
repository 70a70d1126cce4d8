//! OpenStack provider constants

/// Provider type identifier
pub const PROVIDER_TYPE: &str = "openstack";

/// Storage provider name passed to the backup sidecar
pub const STORAGE_PROVIDER_NAME: &str = "Swift";

/// Name of the backup credentials secret in the control-plane namespace
pub const BACKUP_SECRET_NAME: &str = "etcd-backup";

/// Secret key holding the Swift container (bucket) name
pub const BUCKET_NAME_KEY: &str = "bucketName";

/// Secret key holding the Keystone auth URL
pub const AUTH_URL_KEY: &str = "authURL";

/// Secret key holding the Keystone domain name
pub const DOMAIN_NAME_KEY: &str = "domainName";

/// Secret key holding the Keystone user name
pub const USERNAME_KEY: &str = "username";

/// Secret key holding the Keystone password
pub const PASSWORD_KEY: &str = "password";

/// Secret key holding the Keystone tenant name
pub const TENANT_NAME_KEY: &str = "tenantName";
