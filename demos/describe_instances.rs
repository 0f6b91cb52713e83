use anyhow::Result;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tencentcloud_core_sdk::pagination::{paginate, PaginatedRequest, PaginatedResponse};
use tencentcloud_core_sdk::{Client, Credential, Region, ServiceConfig};

#[derive(Debug, Clone, Serialize)]
struct DescribeInstancesRequest {
    #[serde(rename = "Offset")]
    offset: u64,
    #[serde(rename = "Limit")]
    limit: u64,
}

#[derive(Debug, Deserialize)]
struct DescribeInstancesResponse {
    #[serde(rename = "TotalCount")]
    total_count: u64,
    #[serde(rename = "InstanceSet")]
    instance_set: Vec<Instance>,
    #[serde(rename = "RequestId")]
    request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Instance {
    #[serde(rename = "InstanceId")]
    instance_id: String,
    #[serde(rename = "InstanceName")]
    instance_name: Option<String>,
}

impl PaginatedResponse for DescribeInstancesResponse {
    type Item = Instance;

    fn items(&self) -> Vec<Instance> {
        self.instance_set.clone()
    }

    fn total_count(&self) -> Option<u64> {
        Some(self.total_count)
    }
}

impl PaginatedRequest for DescribeInstancesRequest {
    type Response = DescribeInstancesResponse;

    fn next_request(&self, response: &DescribeInstancesResponse) -> Option<Self> {
        let next_offset = self.offset + response.instance_set.len() as u64;
        (next_offset < response.total_count).then(|| DescribeInstancesRequest {
            offset: next_offset,
            limit: self.limit,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let secret_id = std::env::var("TENCENTCLOUD_SECRET_ID")?;
    let secret_key = std::env::var("TENCENTCLOUD_SECRET_KEY")?;

    let client = Client::builder()
        .credential(Credential::new(secret_id, secret_key))
        .build();
    let config = ServiceConfig::new("cvm", "2017-03-12")
        .region(Region::default_from_env().unwrap_or_else(Region::ap_guangzhou));

    let initial = DescribeInstancesRequest {
        offset: 0,
        limit: 20,
    };
    let (total, instances) = paginate(initial, None, |request, region| {
        let client = client.clone();
        let config = config.clone();
        async move {
            let response: DescribeInstancesResponse = client
                .execute(
                    "DescribeInstances",
                    "/",
                    region.as_ref(),
                    Method::POST,
                    &config,
                    false,
                    Some(&request),
                )
                .await?;
            println!("page request id: {}", response.request_id);
            Ok(response)
        }
    })
    .await?;

    println!("{total} instances:");
    for instance in instances {
        println!(
            "  {} {}",
            instance.instance_id,
            instance.instance_name.as_deref().unwrap_or("-")
        );
    }

    client.shutdown().await?;
    Ok(())
}
