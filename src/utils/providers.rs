//! Execution provider parsing and availability listing

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{Result, SegmentationError},
};

/// Information about an execution provider
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

/// Utility for parsing and listing execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse execution provider string in format "backend:provider"
    ///
    /// A bare backend name selects that backend's default provider.
    ///
    /// # Examples
    /// ```rust
    /// use subject_highlight::utils::ExecutionProviderManager;
    /// use subject_highlight::{BackendType, ExecutionProvider};
    ///
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("onnx:cpu").unwrap();
    /// assert_eq!(backend, BackendType::Onnx);
    /// assert_eq!(provider, ExecutionProvider::Cpu);
    /// ```
    ///
    /// # Errors
    /// - Unknown backend or provider
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        let Some((backend, provider)) = provider_str.split_once(':') else {
            return match provider_str {
                "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
                "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                _ => Err(SegmentationError::invalid_config(
                    "Invalid provider format. Use backend:provider (e.g., onnx:auto, tract:cpu)",
                )),
            };
        };

        match backend {
            "onnx" => Ok((BackendType::Onnx, provider.parse()?)),
            "tract" if provider == "cpu" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
            "tract" => Err(SegmentationError::invalid_config(format!(
                "Unknown Tract provider: {provider}. Tract only supports 'cpu'"
            ))),
            _ => Err(SegmentationError::invalid_config(format!(
                "Unknown backend: {backend}. Supported backends: onnx, tract"
            ))),
        }
    }

    /// List all provider combinations with availability for the compiled features
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        {
            use crate::backends::OnnxBackend;
            let availability: std::collections::HashMap<String, bool> =
                OnnxBackend::list_providers()
                    .into_iter()
                    .map(|(name, available, _)| (name.to_lowercase(), available))
                    .collect();
            let auto_available = availability.values().any(|&available| available);

            for (provider, available, description) in [
                (
                    ExecutionProvider::Auto,
                    auto_available,
                    "ONNX Runtime with auto-selected provider",
                ),
                (
                    ExecutionProvider::Cpu,
                    availability.get("cpu").copied().unwrap_or(false),
                    "ONNX Runtime CPU execution",
                ),
                (
                    ExecutionProvider::Cuda,
                    availability.get("cuda").copied().unwrap_or(false),
                    "ONNX Runtime CUDA GPU acceleration",
                ),
                (
                    ExecutionProvider::CoreMl,
                    availability.get("coreml").copied().unwrap_or(false),
                    "ONNX Runtime CoreML (Apple Silicon) acceleration",
                ),
            ] {
                providers.push(ProviderInfo {
                    name: Self::provider_to_string(BackendType::Onnx, provider),
                    backend_type: BackendType::Onnx,
                    execution_provider: provider,
                    available,
                    description: description.to_string(),
                });
            }
        }

        #[cfg(not(feature = "onnx"))]
        providers.push(ProviderInfo {
            name: "onnx:auto".to_string(),
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            available: false,
            description: "ONNX Runtime (feature disabled)".to_string(),
        });

        #[cfg(feature = "tract")]
        {
            use crate::backends::TractBackend;
            for (name, available, description) in TractBackend::list_providers() {
                providers.push(ProviderInfo {
                    name: format!("tract:{}", name.to_lowercase()),
                    backend_type: BackendType::Tract,
                    execution_provider: ExecutionProvider::Cpu,
                    available,
                    description,
                });
            }
        }

        #[cfg(not(feature = "tract"))]
        providers.push(ProviderInfo {
            name: "tract:cpu".to_string(),
            backend_type: BackendType::Tract,
            execution_provider: ExecutionProvider::Cpu,
            available: false,
            description: "Pure Rust CPU inference via Tract (feature disabled)".to_string(),
        });

        providers
    }

    /// Convert backend type and execution provider back to string
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        let backend_str = match backend_type {
            BackendType::Onnx => "onnx",
            BackendType::Tract => "tract",
        };
        format!("{backend_str}:{provider}")
    }
}
