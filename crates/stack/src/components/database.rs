//! Managed relational database with a generated credential secret.
//!
//! The instance never sees a literal password: username and password are
//! dynamic references into the secret, resolved by the platform at deploy
//! time.

use tracing::info;

use super::security::SecurityGroup;
use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::resource::{DeletionPolicy, Resource, ResourceRef, ResourceType};
use crate::stack::Stack;

/// Characters kept out of generated passwords.
///
/// The application's database connection string parser breaks on any of
/// these, so the list must stay exactly as it is.
pub const PASSWORD_EXCLUDED_CHARACTERS: &str = r#"(" %+~`#$&*()|[]{}:;<>?!'/^-,@_=\"#;

/// Length of generated passwords.
pub const PASSWORD_LENGTH: u32 = 30;

/// MySQL listener port.
pub const MYSQL_PORT: u16 = 3306;

/// Database props.
#[derive(Debug, Clone)]
pub struct DatabaseProps {
    pub name: String,
    pub engine_version: String,
    pub instance_class: String,
    pub database_name: String,
    pub username: String,
    pub allocated_storage_gib: u32,
    pub max_allocated_storage_gib: u32,
    pub backup_retention_days: u32,
    pub multi_az: bool,
    /// Subnet list for the DB subnet group.
    pub subnets: Expr,
    pub vpc: ResourceRef,
}

/// Declared database and its supporting resources.
#[derive(Debug, Clone)]
pub struct Database {
    pub instance: ResourceRef,
    pub secret: ResourceRef,
    pub subnet_group: ResourceRef,
    pub security_group: SecurityGroup,
}

impl Database {
    /// Declare secret, subnet group, security group and instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage bounds are inverted or a name is taken.
    pub fn declare(stack: &mut Stack, props: &DatabaseProps) -> Result<Self> {
        if props.allocated_storage_gib == 0
            || props.allocated_storage_gib >= props.max_allocated_storage_gib
        {
            return Err(StackError::invalid(
                "allocated_storage_gib",
                format!(
                    "initial storage ({}) must be positive and below the maximum ({})",
                    props.allocated_storage_gib, props.max_allocated_storage_gib
                ),
            ));
        }

        let name = props.name.as_str();
        let secret = stack.add_resource(
            &format!("{name}-secret"),
            ResourceType::Secret,
            Expr::object([
                (
                    "Description",
                    Expr::join(" ", vec!["Generated by".into(), Expr::stack_name()]),
                ),
                (
                    "GenerateSecretString",
                    Expr::object([
                        (
                            "SecretStringTemplate",
                            Expr::from(format!(r#"{{"username":"{}"}}"#, props.username)),
                        ),
                        ("GenerateStringKey", "password".into()),
                        ("PasswordLength", PASSWORD_LENGTH.into()),
                        ("ExcludeCharacters", PASSWORD_EXCLUDED_CHARACTERS.into()),
                    ]),
                ),
            ]),
        )?;

        let subnet_group = stack.add_resource(
            &format!("{name}-subnet-group"),
            ResourceType::DbSubnetGroup,
            Expr::object([
                ("DBSubnetGroupDescription", Expr::from(format!("Subnet group for {name} database"))),
                ("SubnetIds", props.subnets.clone()),
            ]),
        )?;

        let security_group = SecurityGroup::declare(
            stack,
            &format!("{name}-sg"),
            &format!("Security group for {name} database"),
            &props.vpc,
        )?;

        let instance = stack.insert(
            Resource::new(
                crate::naming::logical_id(name),
                ResourceType::DbInstance,
                Expr::object([
                    ("Engine", Expr::from("mysql")),
                    ("EngineVersion", props.engine_version.as_str().into()),
                    ("DBInstanceClass", props.instance_class.as_str().into()),
                    ("DBName", props.database_name.as_str().into()),
                    ("AllocatedStorage", props.allocated_storage_gib.to_string().into()),
                    ("MaxAllocatedStorage", props.max_allocated_storage_gib.into()),
                    ("StorageType", "gp2".into()),
                    ("StorageEncrypted", true.into()),
                    ("MultiAZ", props.multi_az.into()),
                    ("AutoMinorVersionUpgrade", true.into()),
                    ("EnablePerformanceInsights", true.into()),
                    ("BackupRetentionPeriod", props.backup_retention_days.into()),
                    ("CopyTagsToSnapshot", true.into()),
                    ("PubliclyAccessible", false.into()),
                    ("DBSubnetGroupName", subnet_group.reference()),
                    ("VPCSecurityGroups", Expr::list([security_group.group_id()])),
                    ("MasterUsername", secret_field(&secret, "username")),
                    ("MasterUserPassword", secret_field(&secret, "password")),
                ]),
            )
            .with_removal_policy(DeletionPolicy::Snapshot),
        )?;

        stack.add_resource(
            &format!("{name}-secret-attachment"),
            ResourceType::SecretTargetAttachment,
            Expr::object([
                ("SecretId", secret.reference()),
                ("TargetId", instance.reference()),
                ("TargetType", "AWS::RDS::DBInstance".into()),
            ]),
        )?;

        info!(
            instance = %instance.id(),
            multi_az = props.multi_az,
            storage_gib = props.allocated_storage_gib,
            max_storage_gib = props.max_allocated_storage_gib,
            "Declared database"
        );

        Ok(Self {
            instance,
            secret,
            subnet_group,
            security_group,
        })
    }

    /// Allow the MySQL port from `peer`'s members.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule already exists.
    pub fn allow_default_port_from(
        &self,
        stack: &mut Stack,
        peer: &SecurityGroup,
        description: &str,
    ) -> Result<ResourceRef> {
        self.security_group
            .allow_from(stack, &peer.as_peer(), MYSQL_PORT, description)
    }

    /// Endpoint address attribute.
    #[must_use]
    pub fn endpoint_address(&self) -> Expr {
        self.instance.attr("Endpoint.Address")
    }
}

/// `{{resolve:secretsmanager:<secret>:SecretString:<field>::}}`.
fn secret_field(secret: &ResourceRef, field: &str) -> Expr {
    Expr::join(
        "",
        vec![
            "{{resolve:secretsmanager:".into(),
            secret.reference(),
            format!(":SecretString:{field}::}}}}").into(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(multi_az: bool, allocated: u32) -> Result<(Stack, Database)> {
        let mut stack = Stack::new("db").unwrap();
        let vpc = stack.add_resource("vpc", ResourceType::Vpc, Expr::empty_object())?;
        let db = Database::declare(
            &mut stack,
            &DatabaseProps {
                name: "moodle-db".into(),
                engine_version: "8.0.30".into(),
                instance_class: "db.t3.large".into(),
                database_name: "moodledb".into(),
                username: "dbadmin".into(),
                allocated_storage_gib: allocated,
                max_allocated_storage_gib: 1000,
                backup_retention_days: 7,
                multi_az,
                subnets: Expr::list(["subnet-a", "subnet-b"]),
                vpc,
            },
        )?;
        Ok((stack, db))
    }

    #[test]
    fn test_password_exclusions_are_verbatim() {
        assert_eq!(PASSWORD_EXCLUDED_CHARACTERS.len(), 33);
        for c in ['(', '"', ' ', '%', '`', '\'', '\\', '@', '_', '=', '-'] {
            assert!(PASSWORD_EXCLUDED_CHARACTERS.contains(c), "missing {c:?}");
        }
        let (stack, db) = declare(true, 30).unwrap();
        let secret = stack.resource(db.secret.id()).unwrap();
        assert_eq!(
            secret
                .properties
                .path(&["GenerateSecretString", "ExcludeCharacters"])
                .and_then(Expr::as_str),
            Some(PASSWORD_EXCLUDED_CHARACTERS)
        );
    }

    #[test]
    fn test_credentials_are_references() {
        let (stack, db) = declare(true, 30).unwrap();
        let instance = stack.resource(db.instance.id()).unwrap();
        let password = instance.property("MasterUserPassword").unwrap();
        assert!(!password.is_literal());
        assert_eq!(password.references(), vec![db.secret.id()]);
        let rendered = serde_json::to_string(password).unwrap();
        assert!(rendered.contains("{{resolve:secretsmanager:"));
        assert!(rendered.contains(":SecretString:password::}}"));
    }

    #[test]
    fn test_instance_settings() {
        let (stack, db) = declare(false, 30).unwrap();
        let instance = stack.resource(db.instance.id()).unwrap();
        assert_eq!(instance.property("MultiAZ").and_then(Expr::as_bool), Some(false));
        assert_eq!(instance.property("AllocatedStorage").and_then(Expr::as_i64), Some(30));
        assert_eq!(instance.property("MaxAllocatedStorage").and_then(Expr::as_i64), Some(1000));
        assert_eq!(instance.property("BackupRetentionPeriod").and_then(Expr::as_i64), Some(7));
        assert_eq!(instance.property("StorageEncrypted").and_then(Expr::as_bool), Some(true));
        assert_eq!(instance.deletion_policy, Some(DeletionPolicy::Snapshot));
        assert!(stack.graph().is_ok());
    }

    #[test]
    fn test_storage_bounds_are_enforced() {
        assert!(declare(true, 1000).is_err());
        assert!(declare(true, 0).is_err());
    }
}
