mod common;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use taskwire_amqp::{app_shutdown, AmqpTransport};
    use taskwire_tasks::Transport;

    use crate::common::config::make_topology_config;
    use crate::common::names::random_token;

    #[tokio::test]
    #[ignore]
    async fn round_trip_echoes_the_payload() {
        // Given
        let config = make_topology_config();
        let server = AmqpTransport::new(config.clone());
        server
            .register_callback(Arc::new(|_task_name, payload| Box::pin(async move { Ok(payload) })))
            .await;
        server.connect().await.unwrap();

        let client = AmqpTransport::new(config);
        client.connect().await.unwrap();

        // When
        let payload = random_token().into_bytes();
        let response = client.send_request("echo", payload.clone()).await.unwrap();

        // Then
        assert_eq!(response, payload);

        // Finally
        client.disconnect().await.unwrap();
        server.disconnect().await.unwrap();
        app_shutdown().await;
    }

    #[tokio::test]
    #[ignore]
    async fn concurrent_calls_each_receive_exactly_their_own_response() {
        // Given: a server that echoes back the task name baked into the payload,
        // so a caller getting someone else's response is detectable.
        let config = make_topology_config();
        let server = AmqpTransport::new(config.clone());
        server
            .register_callback(Arc::new(|_task_name, payload| Box::pin(async move { Ok(payload) })))
            .await;
        server.connect().await.unwrap();

        let client = Arc::new(AmqpTransport::new(config));
        client.connect().await.unwrap();

        // When: 32 concurrent calls, each carrying a distinct payload.
        let calls = (0..32usize).map(|i| {
            let client = Arc::clone(&client);
            let payload = format!("call-{i}-{}", random_token()).into_bytes();
            async move {
                let response = client.send_request("echo", payload.clone()).await.unwrap();
                (payload, response)
            }
        });

        let results = futures::future::join_all(calls).await;

        // Then: every call's response matches only its own payload — a
        // correlation-ID mixup would show up as a mismatch here.
        for (payload, response) in results {
            assert_eq!(response, payload);
        }

        // Finally
        client.disconnect().await.unwrap();
        server.disconnect().await.unwrap();
        app_shutdown().await;
    }
}
