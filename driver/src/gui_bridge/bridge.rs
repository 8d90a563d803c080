use crate::gui_bridge::model::VisualizationModel;
use radarcore::pipeline::PipelineSnapshot;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use warp::Filter;

type SharedModel = Arc<RwLock<VisualizationModel>>;

fn gui_bind_address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn read_model(state: &SharedModel) -> VisualizationModel {
    match state.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn routes(
    state: SharedModel,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());

    let tracks_route = warp::path("tracks")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedModel| warp::reply::json(&read_model(&state)));

    let diagnostics_route = warp::path("diagnostics")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter)
        .map(|state: SharedModel| warp::reply::json(&read_model(&state).diagnostics));

    tracks_route.or(diagnostics_route)
}

/// Read-only HTTP view of the live pipeline for the presentation layer.
#[derive(Clone)]
pub struct GuiBridge {
    state: SharedModel,
}

impl GuiBridge {
    pub fn new(model: VisualizationModel) -> Self {
        Self {
            state: Arc::new(RwLock::new(model)),
        }
    }

    /// Hosts the endpoints on `127.0.0.1:port` from a dedicated thread.
    pub fn serve(&self, port: u16) {
        let routes = routes(self.state.clone());
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("failed to build bridge runtime: {err}");
                    return;
                }
            };
            runtime.block_on(async move {
                warp::serve(routes).run(gui_bind_address(port)).await;
            });
        });
        log::info!("HTTP bridge listening on {}", gui_bind_address(port));
    }

    pub fn publish(&self, snapshot: PipelineSnapshot) {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.apply(snapshot);
        log::debug!(
            "[GUI] open tracks: {}, fastest {:.0} mm/s",
            guard.open.len(),
            guard.fastest_speed_mm_s
        );
    }

    pub fn publish_status(&self, message: &str) {
        if let Ok(mut guard) = self.state.write() {
            guard.status = message.to_string();
        }
        log::info!("[GUI] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> VisualizationModel {
        read_model(&self.state)
    }
}
