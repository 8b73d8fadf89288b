//! The Moodle topology: every component wired together in dependency order.

use tracing::{info, warn};

use crate::components::load_balancer::HTTP_PORT;
use crate::components::network::AVAILABILITY_ZONES;
use crate::components::{
    Cache, CacheProps, Cdn, CdnProps, Database, DatabaseProps, FileSystem, FileSystemProps,
    Fleet, FleetProps, LaunchTemplate, LaunchTemplateProps, LoadBalancer, LoadBalancerProps,
    Network, NetworkProps, Peer, SecurityGroup, StagingInstance, StagingProps, SubnetKind,
};
use crate::config::StackConfig;
use crate::error::{Result, StackError};
use crate::intrinsic::Expr;
use crate::stack::{Parameter, Stack};

/// Public SSM parameter tracking the latest Amazon Linux 2 image.
pub const LATEST_AMAZON_LINUX_2: &str =
    "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2";

/// Cache nodes: one primary, one replica.
pub const CACHE_CLUSTERS: u32 = 2;

pub const OUTPUT_ALB_DNS_NAME: &str = "APPLICATION-LOAD-BALANCER-DNS-NAME";
pub const OUTPUT_CLOUDFRONT_DNS_NAME: &str = "CLOUDFRONT-DNS-NAME";
pub const OUTPUT_REDIS_ENDPOINT: &str = "MOODLE-REDIS-PRIMARY-ENDPOINT-ADDRESS-AND-PORT";
pub const OUTPUT_DB_ENDPOINT: &str = "MOODLE-DB-ENDPOINT";
pub const OUTPUT_EFS_ID: &str = "MOODLE-EFS-ID";
pub const OUTPUT_CLOUDFRONT_DIST_ID: &str = "MOODLE-CLOUDFRONT-DIST-ID";

/// The six operator-facing outputs, in declaration order.
pub const OUTPUT_NAMES: [&str; 6] = [
    OUTPUT_ALB_DNS_NAME,
    OUTPUT_CLOUDFRONT_DNS_NAME,
    OUTPUT_REDIS_ENDPOINT,
    OUTPUT_DB_ENDPOINT,
    OUTPUT_EFS_ID,
    OUTPUT_CLOUDFRONT_DIST_ID,
];

/// A fully declared topology.
#[derive(Debug, Clone)]
pub struct Topology {
    pub stack: Stack,
    pub network: Network,
    pub fleet_security_group: SecurityGroup,
    pub launch_template: LaunchTemplate,
    pub fleet: Fleet,
    pub staging_security_group: SecurityGroup,
    pub staging: StagingInstance,
    pub database: Database,
    pub filesystem: FileSystem,
    pub cache: Cache,
    pub load_balancer: LoadBalancer,
    pub cdn: Cdn,
}

impl Topology {
    /// Output names as they appear in the template.
    #[must_use]
    pub fn output_ids() -> Vec<String> {
        OUTPUT_NAMES.iter().map(|name| crate::naming::logical_id(name)).collect()
    }
}

/// Declare the whole topology for `config`.
///
/// # Errors
///
/// Returns the first [`StackError`] raised by configuration validation or by
/// a component declaration.
pub fn build(config: &StackConfig) -> Result<Topology> {
    config.validate()?;

    let mut stack = Stack::new(&config.stack_name)?
        .with_description("Scalable Moodle: autoscaled web fleet with managed database, cache, shared storage and edge distribution");

    let image_id = stack.add_parameter(
        "latest-amazon-linux-2-image",
        Parameter {
            kind: "AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>".into(),
            default: Some(LATEST_AMAZON_LINUX_2.into()),
            description: Some("Image for the fleet and the staging instance".into()),
        },
    )?;
    let key_name = config.has_key_pair().then(|| config.key_name.trim().to_string());
    if key_name.is_none() {
        warn!("Launching instances without a key pair");
    }

    let network = Network::declare(
        &mut stack,
        &NetworkProps {
            name: "moodle-vpc".into(),
            cidr: config.network.cidr,
            nat_gateways: if config.multi_az { AVAILABILITY_ZONES } else { 1 },
        },
    )?;
    let private_subnets = network.subnet_ids(SubnetKind::Private);
    let public_subnets = network.subnet_ids(SubnetKind::Public);

    let fleet_security_group = SecurityGroup::declare(
        &mut stack,
        "moodle-ec2-sg",
        "Security group for the Moodle application instances",
        &network.vpc,
    )?;
    let launch_template = LaunchTemplate::declare(
        &mut stack,
        &LaunchTemplateProps {
            name: "moodle-launch-template".into(),
            image_id: image_id.clone(),
            key_name: key_name.clone(),
            root_volume_gib: config.fleet.root_volume_gib,
            detailed_monitoring: true,
            unlimited_cpu_credits: true,
        },
        &fleet_security_group,
    )?;
    let fleet = Fleet::declare(
        &mut stack,
        &FleetProps {
            name: "moodle-asg".into(),
            subnets: private_subnets.clone(),
            min_capacity: config.fleet.min_capacity,
            max_capacity: config.fleet.max_capacity,
            on_demand_percentage_above_base: config.fleet.on_demand_percentage_above_base,
            instance_types: config.fleet.instance_types.clone(),
        },
        &launch_template,
    )?;
    fleet.scale_on_cpu_utilization(&mut stack, "cpu-scaling", config.fleet.target_cpu_utilization)?;
    network.require_private_egress(&mut stack, &fleet.handle)?;

    let staging_security_group = SecurityGroup::declare(
        &mut stack,
        "moodle-staging-sg",
        "Security group for the Moodle staging instance",
        &network.vpc,
    )?;
    staging_security_group.allow_from(
        &mut stack,
        &Peer::AnyIpv4,
        HTTP_PORT,
        "Allow HTTP from anywhere",
    )?;
    let staging_subnet = network
        .public_subnets
        .first()
        .cloned()
        .ok_or_else(|| StackError::invalid("network", "no public subnet to place staging in"))?;
    let staging = StagingInstance::declare(
        &mut stack,
        &StagingProps {
            name: "moodle-staging-server".into(),
            instance_type: config.staging.instance_type.clone(),
            image_id,
            key_name,
            root_volume_gib: config.fleet.root_volume_gib,
            subnet: staging_subnet,
        },
        &[&fleet_security_group, &staging_security_group],
    )?;
    network.require_public_internet(&mut stack, &staging.instance)?;
    network.require_public_internet(&mut stack, &staging.elastic_ip)?;

    let db = &config.database;
    let database = Database::declare(
        &mut stack,
        &DatabaseProps {
            name: "moodle-db".into(),
            engine_version: db.engine_version.clone(),
            instance_class: db.instance_class.clone(),
            database_name: db.database_name.clone(),
            username: db.username.clone(),
            allocated_storage_gib: db.allocated_storage_gib,
            max_allocated_storage_gib: db.max_allocated_storage_gib,
            backup_retention_days: db.backup_retention_days,
            multi_az: config.multi_az,
            subnets: private_subnets.clone(),
            vpc: network.vpc.clone(),
        },
    )?;
    database.allow_default_port_from(&mut stack, &fleet_security_group, "Allow MySQL from the application instances")?;

    let filesystem = FileSystem::declare(
        &mut stack,
        &FileSystemProps {
            name: "moodle-efs".into(),
            vpc: network.vpc.clone(),
            subnets: network.private_subnets.clone(),
            transition_to_ia_days: config.filesystem.transition_to_ia_days,
        },
    )?;
    filesystem.allow_default_port_from(&mut stack, &fleet_security_group, "Allow NFS from the application instances")?;

    let cache = Cache::declare(
        &mut stack,
        &CacheProps {
            name: "moodle-redis".into(),
            subnet_group_name: format!("{}-redis-subnet-group", config.stack_name.to_lowercase()),
            node_type: config.cache.node_type.clone(),
            num_cache_clusters: CACHE_CLUSTERS,
            multi_az: config.multi_az,
            subnets: private_subnets,
            vpc: network.vpc.clone(),
        },
    )?;
    cache.allow_default_port_from(&mut stack, &fleet_security_group, "Allow Redis from the application instances")?;

    let lb = &config.load_balancer;
    let load_balancer = LoadBalancer::declare(
        &mut stack,
        &LoadBalancerProps {
            name: lb.name.clone(),
            vpc: network.vpc.clone(),
            subnets: public_subnets,
            health_check_timeout_secs: lb.health_check_timeout_secs,
            health_check_interval_secs: lb.health_check_interval_secs,
        },
    )?;
    network.require_public_internet(&mut stack, &load_balancer.handle)?;
    load_balancer.allow_to(&mut stack, &fleet_security_group)?;
    fleet.attach_target_group(&mut stack, &load_balancer.target_group)?;

    let cdn = Cdn::declare(
        &mut stack,
        &CdnProps {
            name: "moodle-cf-dist".into(),
            comment: config.cdn.comment.clone(),
            origin_domain: load_balancer.dns_name(),
            origin_read_timeout_secs: config.cdn.read_timeout_secs,
        },
    )?;

    let outputs: [(&str, Expr); 6] = [
        (OUTPUT_ALB_DNS_NAME, load_balancer.dns_name()),
        (OUTPUT_CLOUDFRONT_DNS_NAME, cdn.domain_name()),
        (OUTPUT_REDIS_ENDPOINT, cache.primary_endpoint()),
        (OUTPUT_DB_ENDPOINT, database.endpoint_address()),
        (OUTPUT_EFS_ID, filesystem.handle.reference()),
        (OUTPUT_CLOUDFRONT_DIST_ID, cdn.distribution_id()),
    ];
    for (name, value) in outputs {
        stack.add_output(name, value)?;
    }

    info!(
        stack = %stack.name(),
        resources = stack.resources().len(),
        outputs = stack.outputs().len(),
        multi_az = config.multi_az,
        "Declared topology"
    );

    Ok(Topology {
        stack,
        network,
        fleet_security_group,
        launch_template,
        fleet,
        staging_security_group,
        staging,
        database,
        filesystem,
        cache,
        load_balancer,
        cdn,
    })
}
