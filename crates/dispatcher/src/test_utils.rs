#[cfg(test)]
pub mod mocks {
    use async_trait::async_trait;
    use mockall::mock;
    use pollmaster_core::DispatchResult;
    use pollmaster_domain::entities::{Agent, DispatchRequest};
    use pollmaster_domain::ports::{AgentClient, AgentHealth};

    mock! {
        pub AgentClient {}

        #[async_trait]
        impl AgentClient for AgentClient {
            async fn check(&self, agent: &Agent) -> DispatchResult<AgentHealth>;
            async fn dispatch(&self, request: &DispatchRequest) -> DispatchResult<()>;
        }
    }
}

#[cfg(test)]
pub mod fixtures {
    use pollmaster_domain::entities::{Agent, Device, DeviceInput};
    use pollmaster_domain::repositories::DeviceRepository;
    use pollmaster_infrastructure::InMemoryStore;

    pub async fn store_with_devices(agents: &[Agent], devices: usize) -> (InMemoryStore, Vec<Device>) {
        let store = InMemoryStore::new();
        for agent in agents {
            store.add_agent(agent.clone()).await;
        }

        let mut created = Vec::new();
        for i in 0..devices {
            let input = DeviceInput::new(format!("device-{i}"), format!("10.1.0.{}", i + 1));
            created.push(store.create(&input).await.unwrap());
        }
        (store, created)
    }
}
