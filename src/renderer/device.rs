//! 设备解析模块
//!
//! 枚举适配器、选择满足最低特性级别的硬件适配器（没有时回退到软件适配器），
//! 然后创建逻辑设备并记录设备支持的最高特性级别。
//!
//! # 选择规则
//!
//! 1. 按驱动报告的顺序遍历适配器
//! 2. 跳过软件模拟适配器
//! 3. 第一个支持最低特性级别的硬件适配器胜出
//! 4. 都不满足时，显式请求平台的软件适配器（WARP）
//!
//! 设备创建失败是致命的，不做重试。

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::error::{Result, GraphicsErrorKind, graphics_error};
use crate::gfx::backend::{GraphicsBackend, RawDevice, RawInstance};
use crate::renderer::resource::PixelFormat;

/// 特性级别
///
/// 按能力从低到高排序，可以直接比较。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureLevel {
    #[serde(rename = "11_0")]
    Level11_0,
    #[serde(rename = "11_1")]
    Level11_1,
    #[serde(rename = "12_0")]
    Level12_0,
    #[serde(rename = "12_1")]
    Level12_1,
    #[serde(rename = "12_2")]
    Level12_2,
}

impl FeatureLevel {
    /// 能力查询时使用的候选列表（降序）
    pub const CANDIDATES: [FeatureLevel; 5] = [
        FeatureLevel::Level12_2,
        FeatureLevel::Level12_1,
        FeatureLevel::Level12_0,
        FeatureLevel::Level11_1,
        FeatureLevel::Level11_0,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureLevel::Level11_0 => "11_0",
            FeatureLevel::Level11_1 => "11_1",
            FeatureLevel::Level12_0 => "12_0",
            FeatureLevel::Level12_1 => "12_1",
            FeatureLevel::Level12_2 => "12_2",
        }
    }
}

/// 适配器描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// 枚举顺序中的位置
    pub index: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub description: String,
    /// 独占显存（字节）
    pub dedicated_video_memory: u64,
    /// 软件模拟适配器（例如 Microsoft Basic Render Driver）
    pub software: bool,
}

/// 设备创建选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceOptions {
    pub min_feature_level: FeatureLevel,
    pub force_software: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            min_feature_level: FeatureLevel::Level11_0,
            force_software: false,
        }
    }
}

/// 在适配器列表中选择第一个满足条件的硬件适配器
///
/// 返回列表中的位置。软件适配器永远不会被选中。
pub fn select_adapter<A>(
    adapters: &[(AdapterInfo, A)],
    supports_min_level: impl Fn(&A) -> bool,
) -> Option<usize> {
    adapters
        .iter()
        .position(|(info, adapter)| !info.software && supports_min_level(adapter))
}

/// 查询设备支持的最高特性级别
///
/// 旧运行时不认识较新的级别时会拒绝整个查询，此时去掉最高的候选后重试；
/// 全部被拒绝时使用创建设备时已经验证过的 `min_level`。
pub fn resolve_feature_level(
    min_level: FeatureLevel,
    mut query: impl FnMut(&[FeatureLevel]) -> Result<FeatureLevel>,
) -> FeatureLevel {
    let candidates = &FeatureLevel::CANDIDATES;

    for start in 0..candidates.len() {
        if candidates[start] < min_level {
            break;
        }
        match query(&candidates[start..]) {
            Ok(level) => return level,
            Err(e) => debug!(
                highest = candidates[start].name(),
                error = %e,
                "Feature level query rejected, retrying without the highest candidate"
            ),
        }
    }

    warn!(
        min_feature_level = min_level.name(),
        "Feature level query failed for every candidate set, assuming the minimum level"
    );
    min_level
}

/// 逻辑设备
///
/// 由图形子系统独占，其他 GPU 对象都通过它创建。
pub struct GraphicsDevice<B: GraphicsBackend> {
    raw: B::Device,
    adapter: AdapterInfo,
    min_feature_level: FeatureLevel,
    feature_level: FeatureLevel,
}

impl<B: GraphicsBackend> GraphicsDevice<B> {
    /// 解析适配器并创建设备
    pub fn create(instance: &B::Instance, options: &DeviceOptions) -> Result<Self> {
        let min_level = options.min_feature_level;

        let (adapter_info, adapter) = if options.force_software {
            info!("Software adapter requested by configuration");
            instance.software_adapter()?
        } else {
            let mut adapters = instance.enumerate_adapters()?;
            for (info, _) in &adapters {
                debug!(
                    index = info.index,
                    description = %info.description,
                    vendor_id = info.vendor_id,
                    device_id = info.device_id,
                    memory_mb = info.dedicated_video_memory / (1024 * 1024),
                    software = info.software,
                    "Adapter found"
                );
            }

            match select_adapter(&adapters, |a| instance.supports_feature_level(a, min_level)) {
                Some(position) => adapters.swap_remove(position),
                None => {
                    warn!(
                        min_feature_level = min_level.name(),
                        "No hardware adapter supports the minimum feature level, falling back to software adapter"
                    );
                    instance.software_adapter()?
                }
            }
        };

        let raw = instance.create_device(&adapter, min_level)?;
        let feature_level = resolve_feature_level(min_level, |levels| raw.max_supported_feature_level(levels));

        if feature_level < min_level {
            return Err(graphics_error(
                GraphicsErrorKind::DeviceCreation,
                format!(
                    "Device reports feature level {} below the requested minimum {}",
                    feature_level.name(),
                    min_level.name()
                ),
            ));
        }

        info!(
            backend = B::name(),
            adapter = %adapter_info.description,
            software = adapter_info.software,
            feature_level = feature_level.name(),
            "Graphics device created"
        );

        Ok(Self {
            raw,
            adapter: adapter_info,
            min_feature_level: min_level,
            feature_level,
        })
    }

    /// 底层设备
    pub fn raw(&self) -> &B::Device {
        &self.raw
    }

    /// 选中的适配器
    pub fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    /// 设备支持的最高特性级别
    pub fn feature_level(&self) -> FeatureLevel {
        self.feature_level
    }

    /// 创建时要求的最低特性级别
    pub fn min_feature_level(&self) -> FeatureLevel {
        self.min_feature_level
    }

    /// 指定格式和采样数下的 MSAA 质量级别数量，0 表示不支持
    pub fn msaa_quality_levels(&self, format: PixelFormat, sample_count: u32) -> Result<u32> {
        self.raw.msaa_quality_levels(format, sample_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::{Headless, HeadlessAdapter, HeadlessInstance};

    fn info(index: u32, software: bool) -> AdapterInfo {
        AdapterInfo {
            index,
            vendor_id: 0x10DE,
            device_id: index,
            description: format!("Adapter {}", index),
            dedicated_video_memory: 0,
            software,
        }
    }

    #[test]
    fn test_feature_level_ordering() {
        assert!(FeatureLevel::Level11_0 < FeatureLevel::Level11_1);
        assert!(FeatureLevel::Level12_2 > FeatureLevel::Level12_1);
        assert!(FeatureLevel::CANDIDATES.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_select_skips_software_adapter() {
        let adapters = vec![(info(0, true), true), (info(1, false), true)];
        assert_eq!(select_adapter(&adapters, |ok| *ok), Some(1));
    }

    #[test]
    fn test_select_none_when_only_software() {
        let adapters = vec![(info(0, true), true), (info(1, true), true)];
        assert_eq!(select_adapter(&adapters, |ok| *ok), None);
    }

    #[test]
    fn test_select_never_picks_software_when_hardware_qualifies() {
        // 枚举 4 个适配器的所有 (软件?, 满足?) 组合
        for mask in 0u32..(1 << 8) {
            let adapters: Vec<(AdapterInfo, bool)> = (0..4)
                .map(|i| {
                    let software = mask & (1 << (2 * i)) != 0;
                    let qualifies = mask & (1 << (2 * i + 1)) != 0;
                    (info(i, software), qualifies)
                })
                .collect();

            let hardware_qualifies = adapters.iter().any(|(i, ok)| !i.software && *ok);
            let chosen = select_adapter(&adapters, |ok| *ok);

            match chosen {
                Some(position) => {
                    let (info, ok) = &adapters[position];
                    assert!(!info.software, "mask {:#b} picked a software adapter", mask);
                    assert!(*ok);
                    // 第一个满足条件的硬件适配器
                    assert!(adapters[..position].iter().all(|(i, ok)| i.software || !*ok));
                }
                None => assert!(!hardware_qualifies, "mask {:#b} missed a hardware adapter", mask),
            }
        }
    }

    #[test]
    fn test_feature_level_query_drops_unknown_levels() {
        let mut attempts = Vec::new();
        let level = resolve_feature_level(FeatureLevel::Level11_0, |levels| {
            attempts.push(levels[0]);
            if levels.contains(&FeatureLevel::Level12_2) {
                Err(graphics_error(GraphicsErrorKind::DeviceCreation, "E_INVALIDARG"))
            } else {
                Ok(levels[0])
            }
        });

        assert_eq!(level, FeatureLevel::Level12_1);
        assert_eq!(attempts, vec![FeatureLevel::Level12_2, FeatureLevel::Level12_1]);
    }

    #[test]
    fn test_feature_level_query_falls_back_to_minimum() {
        let mut calls = 0;
        let level = resolve_feature_level(FeatureLevel::Level12_0, |_| {
            calls += 1;
            Err(graphics_error(GraphicsErrorKind::DeviceCreation, "CheckFeatureSupport failed"))
        });

        assert_eq!(level, FeatureLevel::Level12_0);
        // 12_2、12_1、12_0 三组候选
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_create_prefers_hardware() {
        let instance = HeadlessInstance::new(vec![
            HeadlessAdapter::software("Basic Render Driver"),
            HeadlessAdapter::hardware("Integrated GPU", FeatureLevel::Level11_0),
            HeadlessAdapter::hardware("Discrete GPU", FeatureLevel::Level12_1),
        ]);
        let options = DeviceOptions {
            min_feature_level: FeatureLevel::Level12_0,
            force_software: false,
        };

        let device = GraphicsDevice::<Headless>::create(&instance, &options).unwrap();
        assert_eq!(device.adapter().description, "Discrete GPU");
        assert!(!device.adapter().software);
        assert_eq!(device.feature_level(), FeatureLevel::Level12_1);
        assert_eq!(device.min_feature_level(), FeatureLevel::Level12_0);
    }

    #[test]
    fn test_create_falls_back_to_software_adapter() {
        let instance = HeadlessInstance::new(vec![
            HeadlessAdapter::hardware("Old GPU", FeatureLevel::Level11_0),
        ]);
        let options = DeviceOptions {
            min_feature_level: FeatureLevel::Level12_0,
            force_software: false,
        };

        let device = GraphicsDevice::<Headless>::create(&instance, &options).unwrap();
        assert!(device.adapter().software);
    }

    #[test]
    fn test_force_software() {
        let instance = HeadlessInstance::default();
        let options = DeviceOptions {
            force_software: true,
            ..DeviceOptions::default()
        };
        let device = GraphicsDevice::<Headless>::create(&instance, &options).unwrap();
        assert!(device.adapter().software);
    }

    #[test]
    fn test_device_creation_failure_is_fatal() {
        let instance = HeadlessInstance::default().fail_device_creation();
        let result = GraphicsDevice::<Headless>::create(&instance, &DeviceOptions::default());
        let err = result.err().unwrap();
        assert_eq!(err.graphics_kind(), Some(GraphicsErrorKind::DeviceCreation));
    }

    #[test]
    fn test_msaa_capability_query() {
        let device = GraphicsDevice::<Headless>::create(
            &HeadlessInstance::default(),
            &DeviceOptions::default(),
        )
        .unwrap();
        assert!(device.msaa_quality_levels(PixelFormat::Rgba8Unorm, 4).unwrap() > 0);
        assert_eq!(device.msaa_quality_levels(PixelFormat::Rgba8Unorm, 3).unwrap(), 0);
    }
}
